//! School records: schools and the students enrolled in them.
//!
//! Students are partitioned by school and are tombstoned rather than
//! removed when the manager runs with soft delete enabled.

use crate::error::{ServiceError, ServiceResult};
use crate::identity::fence;
use crate::paging::collect_all;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storekit_manager::{
    require, Compensation, ConfigurationError, DisposeError, ManagedStore, Manager,
    ManagerOptions, StoreSet,
};
use storekit_model::{
    AuditFields, AuditHandler, CacheProxy, Entity, EntitySchema, HandlerProxy, HasAudit,
    HasConcurrencyStamp, HasIdentity, HasPartitionKey, IndexedField, MemoryCache, SoftDelete,
};
use storekit_storage::{
    BackingContext, Context, Database, Page, PageRequest, Query, StorageResult, Store,
};
use storekit_types::{enumeration, ConcurrencyStamp, EntityId, PartitionKey};
use tracing::{info, Span};

enumeration! {
    pub enum SchoolLevel: "school_level" {
        Primary = 1 => "Primary",
        Secondary = 2 => "Secondary",
        Tertiary = 3 => "Tertiary",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct School {
    #[serde(default)]
    pub id: Option<EntityId>,
    #[serde(default)]
    pub concurrency_stamp: Option<ConcurrencyStamp>,
    pub name: String,
    pub level: SchoolLevel,
    #[serde(default)]
    pub audit: AuditFields,
}

impl School {
    pub fn new(name: &str, level: SchoolLevel) -> Self {
        Self {
            id: None,
            concurrency_stamp: None,
            name: name.into(),
            level,
            audit: AuditFields::default(),
        }
    }

    /// Partition that holds this school's students.
    pub fn student_partition(&self) -> ServiceResult<PartitionKey> {
        let id = self
            .id
            .ok_or_else(|| ServiceError::Rejected(format!("school '{}' has not been saved", self.name)))?;
        school_partition(id)
    }
}

fn school_partition(id: EntityId) -> ServiceResult<PartitionKey> {
    PartitionKey::new(id.to_string()).map_err(|e| ServiceError::Rejected(e.to_string()))
}

impl HasIdentity for School {
    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }
}

impl HasConcurrencyStamp for School {
    fn concurrency_stamp(&self) -> Option<&ConcurrencyStamp> {
        self.concurrency_stamp.as_ref()
    }

    fn set_concurrency_stamp(&mut self, stamp: ConcurrencyStamp) {
        self.concurrency_stamp = Some(stamp);
    }
}

impl HasAudit for School {
    fn audit(&self) -> &AuditFields {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut AuditFields {
        &mut self.audit
    }
}

impl Entity for School {
    const ENTITY_TYPE: &'static str = "school";

    fn schema() -> EntitySchema {
        EntitySchema::new(Self::ENTITY_TYPE)
            .table("schools")
            .index(IndexedField::text("/name").unique())
            .index(IndexedField::enumeration::<SchoolLevel>("/level"))
    }

    fn audit_fields(&self) -> Option<&AuditFields> {
        Some(self.audit())
    }

    fn audit_fields_mut(&mut self) -> Option<&mut AuditFields> {
        Some(self.audit_mut())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    #[serde(default)]
    pub id: Option<EntityId>,
    #[serde(default)]
    pub concurrency_stamp: Option<ConcurrencyStamp>,
    school: PartitionKey,
    pub school_id: EntityId,
    pub full_name: String,
    pub enrolled_on: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawn_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub audit: AuditFields,
}

impl Student {
    pub fn new(school: &School, full_name: &str, enrolled_on: NaiveDate) -> ServiceResult<Self> {
        let school_id = school
            .id
            .ok_or_else(|| ServiceError::Rejected(format!("school '{}' has not been saved", school.name)))?;
        Ok(Self {
            id: None,
            concurrency_stamp: None,
            school: school_partition(school_id)?,
            school_id,
            full_name: full_name.into(),
            enrolled_on,
            withdrawn_at: None,
            audit: AuditFields::default(),
        })
    }
}

impl HasIdentity for Student {
    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }
}

impl HasConcurrencyStamp for Student {
    fn concurrency_stamp(&self) -> Option<&ConcurrencyStamp> {
        self.concurrency_stamp.as_ref()
    }

    fn set_concurrency_stamp(&mut self, stamp: ConcurrencyStamp) {
        self.concurrency_stamp = Some(stamp);
    }
}

impl HasPartitionKey for Student {
    fn partition_key(&self) -> &PartitionKey {
        &self.school
    }
}

impl HasAudit for Student {
    fn audit(&self) -> &AuditFields {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut AuditFields {
        &mut self.audit
    }
}

impl SoftDelete for Student {
    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.withdrawn_at
    }

    fn set_deleted_at(&mut self, at: Option<DateTime<Utc>>) {
        self.withdrawn_at = at;
    }
}

impl Entity for Student {
    const ENTITY_TYPE: &'static str = "student";

    fn schema() -> EntitySchema {
        EntitySchema::new(Self::ENTITY_TYPE)
            .table("students")
            .describe("Enrolled students, one partition per school")
            .partitioned()
            .index(IndexedField::reference("/school_id"))
            .index(IndexedField::text("/full_name"))
            .index(IndexedField::datetime("/enrolled_on"))
    }

    fn partition(&self) -> Option<&PartitionKey> {
        Some(self.partition_key())
    }

    fn audit_fields(&self) -> Option<&AuditFields> {
        Some(self.audit())
    }

    fn audit_fields_mut(&mut self) -> Option<&mut AuditFields> {
        Some(self.audit_mut())
    }

    fn soft_delete_mut(&mut self) -> Option<&mut dyn SoftDelete> {
        Some(self)
    }

    fn is_deleted(&self) -> bool {
        self.withdrawn_at.is_some()
    }
}

/// Stores owned by a [`RecordsManager`], released students first.
pub struct RecordsStores<C: BackingContext = Context> {
    pub schools: Store<School, C>,
    pub students: Store<Student, C>,
}

impl<C: BackingContext> StoreSet for RecordsStores<C> {
    fn stores(&self) -> Vec<&dyn ManagedStore> {
        vec![&self.students, &self.schools]
    }

    fn stores_mut(&mut self) -> Vec<&mut dyn ManagedStore> {
        vec![&mut self.students, &mut self.schools]
    }
}

pub struct RecordsManagerBuilder<C: BackingContext = Context> {
    schools: Option<Store<School, C>>,
    students: Option<Store<Student, C>>,
    school_handler: Option<Arc<dyn HandlerProxy<School>>>,
    student_handler: Option<Arc<dyn HandlerProxy<Student>>>,
    school_cache: Option<Arc<dyn CacheProxy<School>>>,
    student_cache: Option<Arc<dyn CacheProxy<Student>>>,
    options: ManagerOptions,
    logger: Option<Span>,
}

impl<C: BackingContext> Default for RecordsManagerBuilder<C> {
    fn default() -> Self {
        Self {
            schools: None,
            students: None,
            school_handler: None,
            student_handler: None,
            school_cache: None,
            student_cache: None,
            options: ManagerOptions::default(),
            logger: None,
        }
    }
}

impl<C: BackingContext> RecordsManagerBuilder<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schools(mut self, store: Store<School, C>) -> Self {
        self.schools = Some(store);
        self
    }

    pub fn students(mut self, store: Store<Student, C>) -> Self {
        self.students = Some(store);
        self
    }

    pub fn school_handler(mut self, handler: Arc<dyn HandlerProxy<School>>) -> Self {
        self.school_handler = Some(handler);
        self
    }

    pub fn student_handler(mut self, handler: Arc<dyn HandlerProxy<Student>>) -> Self {
        self.student_handler = Some(handler);
        self
    }

    pub fn school_cache(mut self, cache: Arc<dyn CacheProxy<School>>) -> Self {
        self.school_cache = Some(cache);
        self
    }

    pub fn student_cache(mut self, cache: Arc<dyn CacheProxy<Student>>) -> Self {
        self.student_cache = Some(cache);
        self
    }

    pub fn options(mut self, options: ManagerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn logger(mut self, span: Span) -> Self {
        self.logger = Some(span);
        self
    }

    pub fn build(self) -> Result<RecordsManager<C>, ConfigurationError> {
        let mut schools = require(self.schools, "schools")?;
        let mut students = require(self.students, "students")?;
        if let Some(handler) = self.school_handler {
            schools = schools.with_handler(handler);
        }
        if let Some(handler) = self.student_handler {
            students = students.with_handler(handler);
        }
        if let Some(cache) = self.school_cache {
            schools = schools.with_cache(cache);
        }
        if let Some(cache) = self.student_cache {
            students = students.with_cache(cache);
        }
        let mut manager = Manager::new(RecordsStores { schools, students }, self.options)?;
        if let Some(span) = self.logger {
            manager = manager.with_logger(span);
        }
        Ok(RecordsManager { manager })
    }
}

/// Undo steps for [`RecordsManager::open_school`].
enum Opened {
    School(EntityId, ConcurrencyStamp),
    Student(EntityId, ConcurrencyStamp),
}

pub struct RecordsManager<C: BackingContext = Context> {
    manager: Manager<RecordsStores<C>>,
}

impl RecordsManager<Context> {
    pub fn register(db: &Database) -> StorageResult<()> {
        db.register_entity::<School>()?;
        db.register_entity::<Student>()
    }

    /// A manager over a fresh context, stamping audit fields as `actor`.
    pub fn for_scope(
        db: &Database,
        actor: Option<&str>,
        options: ManagerOptions,
        cache: Option<Arc<MemoryCache>>,
    ) -> Result<Self, ConfigurationError> {
        let context = Arc::new(db.context());
        let audit = Arc::new(AuditHandler::new());
        let mut schools: Store<School> = Store::new(Arc::clone(&context)).with_handler(audit.clone());
        let mut students: Store<Student> = Store::new(context).with_handler(audit);
        if let Some(actor) = actor {
            schools = schools.with_actor(actor);
            students = students.with_actor(actor);
        }
        if let Some(cache) = cache {
            schools = schools.with_cache(cache.clone());
            students = students.with_cache(cache);
        }
        RecordsManagerBuilder::new()
            .schools(schools)
            .students(students)
            .options(options)
            .build()
    }
}

impl<C: BackingContext> RecordsManager<C> {
    pub fn stores(&self) -> &RecordsStores<C> {
        self.manager.stores()
    }

    // ── Schools ──────────────────────────────────────────────────────

    pub async fn add_school(&self, school: School) -> ServiceResult<School> {
        if school.name.trim().is_empty() {
            return Err(ServiceError::Rejected("school name must not be blank".into()));
        }
        Ok(self.stores().schools.create(school).await?)
    }

    pub async fn school(&self, id: &EntityId) -> ServiceResult<School> {
        Ok(self.stores().schools.read(id).await?)
    }

    pub async fn rename_school(&self, mut school: School, name: &str) -> ServiceResult<School> {
        school.name = name.into();
        Ok(self.stores().schools.update(school).await?)
    }

    /// Creates a school together with its first students.
    ///
    /// If any step fails, everything created so far is deleted again.
    pub async fn open_school(
        &self,
        school: School,
        students: &[(&str, NaiveDate)],
    ) -> ServiceResult<(School, Vec<Student>)> {
        let mut undo = Compensation::new();
        let outcome = self.open_school_steps(school, students, &mut undo).await;
        match outcome {
            Ok(opened) => {
                undo.commit();
                info!(school_id = ?opened.0.id, students = opened.1.len(), "Opened school");
                Ok(opened)
            }
            Err(source) => {
                let stores = self.stores();
                let report = undo
                    .compensate(move |step| async move {
                        match step {
                            Opened::School(id, stamp) => stores.schools.delete(&id, &stamp).await?,
                            Opened::Student(id, stamp) => stores.students.delete(&id, &stamp).await?,
                        }
                        Ok::<(), anyhow::Error>(())
                    })
                    .await;
                match source {
                    ServiceError::Store(source) if !report.is_clean() => {
                        Err(ServiceError::PartiallyApplied {
                            source,
                            unrecovered: report.failures.len(),
                        })
                    }
                    other => Err(other),
                }
            }
        }
    }

    async fn open_school_steps(
        &self,
        school: School,
        students: &[(&str, NaiveDate)],
        undo: &mut Compensation<Opened>,
    ) -> ServiceResult<(School, Vec<Student>)> {
        let school = self.add_school(school).await?;
        let (id, stamp) = fence(&school)?;
        undo.record(Opened::School(id, stamp));

        let mut enrolled = Vec::with_capacity(students.len());
        for (name, enrolled_on) in students {
            let student = self.enroll(&school, name, *enrolled_on).await?;
            let (id, stamp) = fence(&student)?;
            undo.record(Opened::Student(id, stamp));
            enrolled.push(student);
        }
        Ok((school, enrolled))
    }

    /// Deletes a school that has no live students.
    pub async fn close_school(&self, school: &School) -> ServiceResult<()> {
        let (id, stamp) = fence(school)?;
        let remaining = self
            .stores()
            .students
            .query(Query::all().in_partition(school.student_partition()?).page(PageRequest::first().with_size(1)))
            .await?;
        if !remaining.is_empty() {
            return Err(ServiceError::Rejected(format!(
                "school '{}' still has enrolled students",
                school.name
            )));
        }
        Ok(self.stores().schools.delete(&id, &stamp).await?)
    }

    // ── Students ─────────────────────────────────────────────────────

    pub async fn enroll(&self, school: &School, full_name: &str, enrolled_on: NaiveDate) -> ServiceResult<Student> {
        if full_name.trim().is_empty() {
            return Err(ServiceError::Rejected("student name must not be blank".into()));
        }
        let student = Student::new(school, full_name, enrolled_on)?;
        Ok(self.stores().students.create(student).await?)
    }

    pub async fn student(&self, id: &EntityId) -> ServiceResult<Student> {
        Ok(self.stores().students.read(id).await?)
    }

    pub async fn update_student(&self, student: Student) -> ServiceResult<Student> {
        Ok(self.stores().students.update(student).await?)
    }

    /// One page of a school's live students, ordered by name.
    pub async fn students_of(&self, school: &School, page: PageRequest) -> ServiceResult<Page<Student>> {
        Ok(self
            .stores()
            .students
            .query(
                Query::all()
                    .in_partition(school.student_partition()?)
                    .order_by(|a: &Student, b: &Student| a.full_name.cmp(&b.full_name))
                    .page(page),
            )
            .await?)
    }

    /// Every student ever enrolled, withdrawn ones included.
    pub async fn enrollment_history(&self, school: &School) -> ServiceResult<Vec<Student>> {
        let partition = school.student_partition()?;
        Ok(collect_all(&self.stores().students, || {
            Query::all().in_partition(partition.clone()).with_deleted()
        })
        .await?)
    }

    /// Removes a student, or tombstones it when soft delete is enabled.
    pub async fn withdraw(&self, student: &Student) -> ServiceResult<()> {
        let (id, stamp) = fence(student)?;
        Ok(self.stores().students.delete(&id, &stamp).await?)
    }

    pub async fn dispose(self) -> Result<(), DisposeError> {
        self.manager.dispose().await
    }
}
