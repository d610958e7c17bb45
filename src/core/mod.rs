// Domain-layer modules and shared errors/models
pub mod analysis {
    pub use crate::analysis::*;
}

pub mod gifts {
    pub use crate::gifts::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod recommendation {
    pub use crate::recommendation::*;
}

pub mod scoring {
    pub use crate::scoring::*;
}

pub mod segmentation {
    pub use crate::segmentation::*;
}

pub mod errors {
    pub use crate::errors::*;
}
