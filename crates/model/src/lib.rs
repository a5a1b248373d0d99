pub use serde_with;

pub mod progress;
pub mod route;
pub mod stop;
pub mod stop_state;

/// Representative values, used for documentation, demos and tests.
pub trait ExampleData {
    fn example_data() -> Self;
}
