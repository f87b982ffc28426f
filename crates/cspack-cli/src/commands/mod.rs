mod inspect;
mod manifest;
mod package;

pub use inspect::inspect;
pub use manifest::manifest;
pub use package::package;
