// AvrSim - AVR Instruction-Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Program and data stores fed by an external image loader.

use crate::decoder::{AvrDecoder, DecodedInstruction, Decoder};
use crate::{SimResult, SimulationError};
use std::collections::{BTreeMap, HashMap};

/// Unified image addresses below this land in flash.
pub const DATA_IMAGE_BASE: u32 = 0x80_0000;
pub const EEPROM_IMAGE_BASE: u32 = 0x81_0000;
pub const IMAGE_END: u32 = 0x82_0000;

/// Bidirectional name/address map of one store.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    by_name: HashMap<String, u32>,
    by_addr: BTreeMap<u32, String>,
}

impl SymbolTable {
    pub fn add(&mut self, name: impl Into<String>, addr: u32) {
        let name = name.into();
        self.by_addr.entry(addr).or_insert_with(|| name.clone());
        self.by_name.insert(name, addr);
    }

    pub fn address_of(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    /// First symbol registered at exactly `addr`.
    pub fn symbol_at(&self, addr: u32) -> Option<&str> {
        self.by_addr.get(&addr).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

fn check_fits(store: &'static str, size: usize, data: &[u8], offset: u32) -> SimResult<()> {
    let end = offset as usize + data.len();
    if end > size {
        return Err(SimulationError::ImageOutOfRange {
            store,
            addr: offset,
            len: data.len(),
        });
    }
    Ok(())
}

/// Program memory with one pre-decoded instruction per word.
#[derive(Debug)]
pub struct Flash {
    bytes: Vec<u8>,
    decoded: Vec<Box<dyn DecodedInstruction>>,
    decoder: Box<dyn Decoder>,
    symbols: SymbolTable,
}

impl Flash {
    /// Erased flash reads as zero words, i.e. NOPs.
    pub fn new(size: usize) -> Self {
        let mut flash = Self {
            bytes: vec![0; size & !1],
            decoded: Vec::new(),
            decoder: Box::new(AvrDecoder),
            symbols: SymbolTable::default(),
        };
        flash.decode_all();
        flash
    }

    pub fn set_decoder(&mut self, decoder: Box<dyn Decoder>) {
        self.decoder = decoder;
        self.decode_all();
    }

    fn decode_all(&mut self) {
        let words = self.word_count();
        self.decoded = (0..words as u32)
            .map(|w| self.decoder.decode(self.word(w), self.word(w + 1)))
            .collect();
    }

    fn word(&self, index: u32) -> u16 {
        let i = index as usize * 2;
        match self.bytes.get(i..i + 2) {
            Some(b) => u16::from_le_bytes([b[0], b[1]]),
            None => 0,
        }
    }

    /// Byte size.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn word_count(&self) -> usize {
        self.bytes.len() / 2
    }

    pub fn read_word(&self, index: u32) -> Option<u16> {
        ((index as usize) < self.word_count()).then(|| self.word(index))
    }

    pub fn instruction(&self, index: u32) -> Option<&dyn DecodedInstruction> {
        self.decoded.get(index as usize).map(|d| d.as_ref())
    }

    /// Copy `data` to byte `offset` and re-decode every word it touches,
    /// plus the word before it whose second half may have changed.
    pub fn write_mem(&mut self, data: &[u8], offset: u32) -> SimResult<()> {
        check_fits("flash", self.bytes.len(), data, offset)?;
        if data.is_empty() {
            return Ok(());
        }
        let start = offset as usize;
        self.bytes[start..start + data.len()].copy_from_slice(data);

        let first = (start / 2).saturating_sub(1);
        let last = (start + data.len()).div_ceil(2).min(self.word_count());
        for w in first..last {
            self.decoded[w] = self.decoder.decode(self.word(w as u32), self.word(w as u32 + 1));
        }
        Ok(())
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }
}

#[derive(Debug, Clone)]
pub struct Eeprom {
    bytes: Vec<u8>,
    symbols: SymbolTable,
}

impl Eeprom {
    /// Erased EEPROM reads as 0xFF.
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0xFF; size],
            symbols: SymbolTable::default(),
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn read(&self, addr: u32) -> Option<u8> {
        self.bytes.get(addr as usize).copied()
    }

    pub fn write_mem(&mut self, data: &[u8], offset: u32) -> SimResult<()> {
        check_fits("eeprom", self.bytes.len(), data, offset)?;
        let start = offset as usize;
        self.bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Unified image address.
    pub address: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    /// Unified image address.
    pub address: u32,
}

/// Sections and symbols already pulled out of an object file.
#[derive(Debug, Clone, Default)]
pub struct ProgramImage {
    pub sections: Vec<Section>,
    pub symbols: Vec<Symbol>,
}

impl ProgramImage {
    /// A raw binary placed at flash address 0.
    pub fn from_flash_bytes(data: Vec<u8>) -> Self {
        Self {
            sections: vec![Section { address: 0, data }],
            symbols: Vec::new(),
        }
    }
}
