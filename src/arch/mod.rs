//! # Architecture Abstraction Layer
//!
//! Hardware implementations of the platform traits the low-power manager
//! drives. Currently implements the Cortex-M4 port; other MCUs add sibling
//! modules.

pub mod cortex_m4;
