//! Rubberduck Types - shared data model
//!
//! Types shared between the relay, the edge forwarder, and the upstream
//! provider adapter:
//! - [`Persona`] and the persona registry (system prompts + display metadata)
//! - [`AnalysisRequest`], the validated inbound request
//! - [`DeltaChunk`], one non-empty fragment of model output
//! - [`ErrorBody`], the JSON error payload returned before streaming starts

mod chunk;
mod persona;
mod request;

pub use chunk::DeltaChunk;
pub use persona::{Persona, PersonaInfo, UnknownPersona, PERSONAS};
pub use request::{
    AnalysisRequest, ErrorBody, CLIENT_ADDRESS_HEADER, SERVICE_KEY_HEADER, USER_PREAMBLE,
};
