pub mod brands;
pub mod categories;
pub mod partners;
pub mod pricelists;
pub mod products;
