pub mod blueprint;
pub mod ids;
pub mod particle;
pub mod site;
pub mod species;
