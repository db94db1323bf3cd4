mod types;

pub use types::{
    Element, Feedback, Metadata, PersistedUser, Step, Thread, ThreadUpdate, User,
};
