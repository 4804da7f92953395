pub mod driver;
pub mod offer;
pub mod trip;
