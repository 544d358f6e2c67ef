pub mod changeset;
pub mod check;
pub mod load;
pub mod replay;
pub mod summary;

pub use changeset::{changeset, ChangesetArgs};
pub use check::{check, CheckArgs};
pub use replay::{replay, ReplayArgs};
pub use summary::{summary, SummaryArgs};
