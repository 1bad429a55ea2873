pub mod models;
pub mod repository;

pub use models::Registration;
pub use repository::RegistrationRepository;
