pub mod cases;
pub mod forecast;
pub mod sampling;
