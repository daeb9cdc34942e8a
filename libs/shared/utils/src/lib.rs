pub mod phone;
pub mod test_utils;

pub use phone::PhoneMatchPolicy;
