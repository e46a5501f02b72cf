mod reference;
mod tensor;
mod validation;

pub use reference::*;
pub use tensor::*;
pub use validation::*;
