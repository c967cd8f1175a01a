/// Request body extractors
use crate::error::PortalError;
use axum::extract::FromRequest;

/// JSON body whose rejections are reported as `PortalError::Validation`
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(PortalError))]
pub struct ApiJson<T>(pub T);
