//! External service integrations.

pub mod notifications {
    pub use crate::notifications::*;
}
