//! # Quant
//!
//! $$
//! (\mu,\Sigma)\mapsto \mathbf{w}^\*
//! $$
//!
pub mod portfolio;
