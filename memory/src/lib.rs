pub mod heap;
pub mod userdata;
pub mod value;


pub use heap::{Arena, Heap, Map, SweepStats};
pub use userdata::{Ownership, UserData};
pub use value::Value;
