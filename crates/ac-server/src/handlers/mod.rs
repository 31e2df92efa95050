pub mod passports;
pub mod results;
pub mod sessions;
pub mod share_links;
