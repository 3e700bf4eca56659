pub mod dispatch_service;
pub mod error;
pub mod projection_service;
pub mod workflow_service;
