//! Domain types - callers, keys, decisions and the records kept per caller.

mod bucket;
mod caller;
mod decision;
mod key;
mod record;

pub use bucket::{BucketOutcome, BucketSpec, TokenBucketState};
pub use caller::{ApiCredential, CallerIdentity, UserProfile};
pub use decision::{Admission, AdmissionDecision, QuotaSnapshot, Rejection, RejectionReason, codes};
pub use key::{Identifier, RateLimitKey, Scope};
pub use record::{
    ActiveLimit, BlockRecord, REPEATED_VIOLATIONS_REASON, RateLimitStatus, WhitelistEntry,
};
