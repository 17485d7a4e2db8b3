pub mod clock;
pub mod coordinator;
pub mod finalizer;
pub mod lock_table;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{HoldGrant, HoldPolicy, ReservationCoordinator, SeatMap};
pub use finalizer::BookingFinalizer;
pub use lock_table::{HoldOwner, Lock, LockError, LockSet, LockTable, SeatState, ShowPartition};
pub use token::{HoldClaims, HoldTokenCodec, TokenError};
