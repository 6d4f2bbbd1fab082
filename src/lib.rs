pub mod form;
pub mod prelude;
