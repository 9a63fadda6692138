pub mod memory;

pub use memory::InMemoryAddressStore;
