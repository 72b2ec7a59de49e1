pub mod host;
pub mod machine;
pub mod remediation;

pub use host::*;
pub use machine::*;
pub use remediation::*;
