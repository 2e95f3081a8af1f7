pub mod memory;
pub mod model;
pub mod pg;
pub mod store;

pub use memory::InMemoryTraineeStore;
pub use model::{AccountKind, NewTrainee, Trainee, TraineeStats, TraineeUpdate};
pub use pg::PgTraineeStore;
pub use store::{StoreError, TraineeStore};
