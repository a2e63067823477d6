//! Domain services built on StoreKit.
//!
//! Each service is a manager over a fixed set of stores:
//! - [`IdentityManager`] owns users and their claims, hashes passwords and
//!   upgrades stale digests at sign-in
//! - [`RecordsManager`] owns schools and the students enrolled in them
//!
//! Both are constructed per request scope, either through `for_scope` with
//! the stock audit handler or through their builders with explicit stores.

mod error;
mod identity;
mod paging;
mod records;

pub use error::{ServiceError, ServiceResult};
pub use identity::{
    normalize_user_name, IdentityManager, IdentityManagerBuilder, IdentityStores, Role, User,
    UserClaim,
};
pub use records::{
    RecordsManager, RecordsManagerBuilder, RecordsStores, School, SchoolLevel, Student,
};
