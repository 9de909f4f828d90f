//! Compatibility gateway between legacy whazzup clients and the modern
//! JSON status data published by the flight-simulation network.
//!
//! The gateway periodically fetches upstream network information in both the
//! legacy text and the modern JSON format, converts the modern data file back
//! into the legacy encoding on demand and augments ATC records with
//! coordinates resolved from static reference data and the live transceivers
//! feed.

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod fetch;
pub mod geo;
pub mod locate;
pub mod model;
pub mod periodic;
pub mod random;
pub mod retrieval;
pub mod server;

/// Banner prepended to every legacy-format body served by the gateway.
pub const SERVER_DISCLAIMER_HEADER: &str = "\
YOU ARE ACCESSING THE COMPATIBILITY GATEWAY FOR NETWORK STATUS FILES

This gateway is supposed to be used only in order to establish compatibility
between legacy applications and later revisions of status/data files.

The intended use does not cover clients used for active participation on the
network (e.g. pilot/ATC clients).

The gateway is inofficial and not supported by the network. Please avoid
running pilot or ATC clients on files provided through this gateway.

If you experience any issues accessing data or connecting to the network,
please disable the gateway and try again.

All data served by this gateway remains under copyright of the network it
was retrieved from. Usage of that data remains subject to the conditions
defined by that network.
";
