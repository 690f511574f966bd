pub mod clock_service;
pub mod deadline_service;
pub mod execution_service;
pub mod hash_service;
pub mod internal_auth_service;
pub mod metrics_service;
pub mod orchestrator_service;
pub mod payment_binding_service;
pub mod remote_execution_service;
pub mod schema_registry_service;
pub mod sweep_service;
pub mod validation_service;
