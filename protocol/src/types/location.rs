//! # Shard Locations
//!
//! The chain is partitioned into a three-level hierarchy: one Prime chain,
//! a set of Regions under it, and a set of Zones under each Region. Every
//! lookup in this crate is scoped to exactly one [`Location`].
//!
//! The context decides which indices exist, so the type is an enum rather
//! than a struct with optional fields: a Prime location cannot carry a
//! stray region index, and two locations compare equal only when all of
//! their indices match.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Level of a location in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Context {
    Prime,
    Region,
    Zone,
}

impl Context {
    /// Numeric depth: 0 for Prime, 1 for Region, 2 for Zone.
    pub fn level(self) -> u32 {
        match self {
            Context::Prime => 0,
            Context::Region => 1,
            Context::Zone => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Context::Prime => "prime",
            Context::Region => "region",
            Context::Zone => "zone",
        }
    }
}

/// A shard in the Prime → Region → Zone hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Location {
    /// The dominant chain. Carries no indices.
    Prime,
    /// A region chain, identified by its region index.
    Region(u32),
    /// A zone chain, identified by (region index, zone index).
    Zone(u32, u32),
}

impl Location {
    pub fn context(&self) -> Context {
        match self {
            Location::Prime => Context::Prime,
            Location::Region(_) => Context::Region,
            Location::Zone(_, _) => Context::Zone,
        }
    }

    /// Region index, if this location has one.
    pub fn region(&self) -> Option<u32> {
        match self {
            Location::Prime => None,
            Location::Region(r) | Location::Zone(r, _) => Some(*r),
        }
    }

    /// Zone index, if this location has one.
    pub fn zone(&self) -> Option<u32> {
        match self {
            Location::Zone(_, z) => Some(*z),
            _ => None,
        }
    }

    /// Canonical name used in topic derivation: `prime`, `region-<r>` or
    /// `zone-<r>-<z>`.
    ///
    /// Every implementation on the network must produce byte-identical
    /// names, so this format is part of the wire contract.
    pub fn name(&self) -> String {
        match self {
            Location::Prime => "prime".to_string(),
            Location::Region(r) => format!("region-{r}"),
            Location::Zone(r, z) => format!("zone-{r}-{z}"),
        }
    }

    /// The location directly above this one, if any.
    pub fn dominant(&self) -> Option<Location> {
        match self {
            Location::Prime => None,
            Location::Region(_) => Some(Location::Prime),
            Location::Zone(r, _) => Some(Location::Region(*r)),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Error returned when a location name does not parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid location name: {0:?}")]
pub struct ParseLocationError(pub String);

impl FromStr for Location {
    type Err = ParseLocationError;

    /// Parses the canonical names produced by [`Location::name`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseLocationError(s.to_string());
        let mut parts = s.split('-');
        let head = parts.next().ok_or_else(invalid)?;
        let mut index = || -> Result<u32, ParseLocationError> {
            parts
                .next()
                .and_then(|p| p.parse::<u32>().ok())
                .ok_or_else(invalid)
        };

        let location = match head {
            "prime" => Location::Prime,
            "region" => Location::Region(index()?),
            "zone" => {
                let region = index()?;
                Location::Zone(region, index()?)
            }
            _ => return Err(invalid()),
        };

        if s != location.name() {
            return Err(invalid());
        }
        Ok(location)
    }
}
