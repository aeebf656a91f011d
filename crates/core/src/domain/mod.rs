pub mod money;
pub mod request;
pub mod site;
