//! CAS identifier decomposition
//!
//! The 32-bit identifier carried by every part locator packs three fields:
//! bits 0–7 the CAS file index (1-based, `cas_NN.cas`), bits 8–23 the
//! package id within its layer, bit 24 the layer id. Bits 25–31 are
//! reserved and must be clear; the layout resolver asserts at
//! initialization that every observed value fits these widths.

use std::fmt;

use sbtoc_parser::CasId;

use crate::error::{Error, Result};

const INDEX_BITS: u32 = 8;
const PACKAGE_BITS: u32 = 16;
const LAYER_SHIFT: u32 = INDEX_BITS + PACKAGE_BITS;
const RESERVED_MASK: u32 = !0u32 << (LAYER_SHIFT + 1);

/// Layer of the installation tree. Patch shadows Data by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Layer {
    Data,
    Patch,
}

impl Layer {
    pub fn id(self) -> u32 {
        match self {
            Self::Data => 0,
            Self::Patch => 1,
        }
    }

    /// Directory name of the layer under the game root.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Data => "Data",
            Self::Patch => "Patch",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// The decoded fields of a CAS identifier: one concrete archive file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CasFileKey {
    pub layer: Layer,
    pub package: u16,
    /// 1-based index into the package's `cas_NN.cas` files.
    pub index: u8,
}

impl CasFileKey {
    pub fn decode(id: CasId) -> Result<Self> {
        let value = id.value();
        if value & RESERVED_MASK != 0 {
            return Err(Error::FormatMismatch(format!(
                "CAS identifier {id} has reserved bits set"
            )));
        }
        let index = (value & 0xff) as u8;
        if index == 0 {
            return Err(Error::FormatMismatch(format!(
                "CAS identifier {id} has a zero file index"
            )));
        }
        let package = ((value >> INDEX_BITS) & 0xffff) as u16;
        let layer = if value >> LAYER_SHIFT & 1 == 0 {
            Layer::Data
        } else {
            Layer::Patch
        };
        Ok(Self {
            layer,
            package,
            index,
        })
    }

    pub fn encode(self) -> CasId {
        CasId::new(
            u32::from(self.index)
                | (u32::from(self.package) << INDEX_BITS)
                | (self.layer.id() << LAYER_SHIFT),
        )
    }

    /// On-disk name of the archive file, `cas_NN.cas`.
    pub fn file_name(self) -> String {
        format!("cas_{:02}.cas", self.index)
    }
}

impl fmt::Display for CasFileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/package {}/cas_{:02}",
            self.layer, self.package, self.index
        )
    }
}
