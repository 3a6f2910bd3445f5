pub mod page;
pub mod sitemap;
