// Domain-layer modules and shared errors/models
pub mod wallet {
    pub use crate::wallet::*;
}

pub mod subscriptions {
    pub use crate::subscriptions::*;
}

pub mod unlock {
    pub use crate::unlock::*;
}

pub mod candidates {
    pub use crate::candidates::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
