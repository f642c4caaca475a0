// Public (no session) and protected (session, optionally feature-gated) handlers.
pub mod protected;
pub mod public;
