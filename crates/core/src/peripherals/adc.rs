// AvrSim - AVR Instruction-Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::signals::PinId;
use crate::{Peripheral, PeripheralContext, PeripheralTickResult, SimResult};
use std::any::Any;

pub const ADEN: u8 = 0x80;
pub const ADSC: u8 = 0x40;
pub const ADFR: u8 = 0x20;
pub const ADIF: u8 = 0x10;
pub const ADIE: u8 = 0x08;
pub const ADPS_MASK: u8 = 0x07;
pub const MUX_MASK: u8 = 0x07;

/// Half-clock unit at which the input is sampled (1.5 ADC clocks).
const SAMPLE_AT: u8 = 3;
/// Half-clock unit at which the result is ready (13 ADC clocks).
const RESULT_AT: u8 = 26;
/// End of a single conversion (14 ADC clocks).
const DONE_AT: u8 = 28;
/// First conversion warm-up length.
const INIT_LEN: u8 = 26;

/// Peripheral-local register indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AdcRegister {
    Admux = 0,
    Adcsr = 1,
    Adch = 2,
    Adcl = 3,
}

impl AdcRegister {
    pub fn from_index(reg: u8) -> Option<Self> {
        match reg {
            0 => Some(Self::Admux),
            1 => Some(Self::Adcsr),
            2 => Some(Self::Adch),
            3 => Some(Self::Adcl),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum ConversionState {
    #[default]
    Idle,
    /// First conversion after power-up.
    Init,
    Running,
}

/// 10-bit successive approximation ADC with an 8-way input multiplexer.
#[derive(Debug, serde::Serialize)]
pub struct Adc {
    #[serde(skip)]
    channels: [PinId; 8],
    #[serde(skip)]
    aref: PinId,
    vector: usize,
    admux: u8,
    adcsr: u8,
    state: ConversionState,
    prescaler: u8,
    /// Half-clock counter.
    clk: u8,
    used_before: bool,
    /// Sample normalized to 0..=i32::MAX of the reference.
    sample: u32,
    adch: u8,
    adcl: u8,
    /// A result was stored and ADCL has not been read since.
    adch_locked: bool,
}

impl Adc {
    pub fn new(channels: [PinId; 8], aref: PinId, vector: usize) -> Self {
        Self {
            channels,
            aref,
            vector,
            admux: 0,
            adcsr: 0,
            state: ConversionState::Idle,
            prescaler: 0,
            clk: 0,
            used_before: false,
            sample: 0,
            adch: 0,
            adcl: 0,
            adch_locked: false,
        }
    }

    pub fn vector(&self) -> usize {
        self.vector
    }

    pub fn state(&self) -> ConversionState {
        self.state
    }

    pub fn admux(&self) -> u8 {
        self.admux
    }

    pub fn adcsr(&self) -> u8 {
        self.adcsr
    }

    /// Last 10-bit result.
    pub fn result(&self) -> u16 {
        ((self.adch as u16) << 8) | self.adcl as u16
    }

    pub fn is_locked(&self) -> bool {
        self.adch_locked
    }

    fn divider(&self) -> u8 {
        match self.adcsr & ADPS_MASK {
            0 | 1 => 1,
            n => 1 << (n - 1),
        }
    }

    fn write_adcsr(&mut self, value: u8, ctx: &mut PeripheralContext<'_>) {
        let mut old = self.adcsr & (ADIF | ADSC);
        if value & ADIF != 0 {
            old &= !ADIF;
        }
        self.adcsr = old | (value & !ADIF);

        if self.adcsr & ADEN == 0 {
            self.prescaler = 0;
            self.clk = 0;
        }

        ctx.irq.set_enabled(self.vector, self.adcsr & ADIE != 0);
        if self.adcsr & (ADIE | ADIF) == (ADIE | ADIF) {
            ctx.irq.set_pending(self.vector);
        } else {
            ctx.irq.clear_pending(self.vector);
        }
    }

    fn take_sample(&mut self, ctx: &PeripheralContext<'_>) {
        let channel = self.channels[(self.admux & MUX_MASK) as usize];
        let reference = ctx.signals.analog(self.aref);
        let raw = ctx.signals.analog(channel).min(reference);
        self.sample = if reference == 0 {
            i32::MAX as u32
        } else {
            ((raw as f64 / reference as f64) * i32::MAX as f64) as u32
        };
        tracing::debug!(
            "ADC sampled channel {}: {} of {}",
            self.admux & MUX_MASK,
            raw,
            reference
        );
    }

    fn finish_conversion(&mut self, ctx: &mut PeripheralContext<'_>) {
        let result = (self.sample >> 21) as u16;
        if self.adch_locked {
            tracing::warn!(
                "ADC result {} lost: previous result not yet consumed through ADCL",
                result
            );
        } else {
            self.adch = (result >> 8) as u8;
            self.adcl = (result & 0xFF) as u8;
            self.adch_locked = true;
        }

        self.adcsr |= ADIF;
        if self.adcsr & ADIE != 0 {
            ctx.irq.set_pending(self.vector);
        }
        if self.adcsr & ADFR != 0 {
            self.clk = 0;
        } else {
            self.adcsr &= !ADSC;
        }
        tracing::debug!("ADC conversion complete: {}", result);
    }

    fn on_half_clock(&mut self, ctx: &mut PeripheralContext<'_>) {
        match self.state {
            ConversionState::Idle => {
                self.clk = 0;
                if self.adcsr & ADSC != 0 {
                    self.state = if self.used_before {
                        ConversionState::Running
                    } else {
                        ConversionState::Init
                    };
                    tracing::debug!("ADC start: {:?}", self.state);
                }
            }
            ConversionState::Init => {
                if self.clk == INIT_LEN {
                    self.state = ConversionState::Running;
                    self.clk = 2;
                    self.used_before = true;
                }
            }
            ConversionState::Running => match self.clk {
                SAMPLE_AT => self.take_sample(ctx),
                RESULT_AT => self.finish_conversion(ctx),
                DONE_AT => {
                    self.clk = 0;
                    self.state = ConversionState::Idle;
                }
                _ => {}
            },
        }
    }
}

impl Peripheral for Adc {
    fn read(&mut self, reg: u8, _ctx: &mut PeripheralContext<'_>) -> SimResult<u8> {
        let value = match AdcRegister::from_index(reg) {
            Some(AdcRegister::Admux) => self.admux,
            Some(AdcRegister::Adcsr) => self.adcsr,
            Some(AdcRegister::Adch) => self.adch,
            Some(AdcRegister::Adcl) => {
                self.adch_locked = false;
                self.adcl
            }
            None => 0,
        };
        Ok(value)
    }

    fn write(&mut self, reg: u8, value: u8, ctx: &mut PeripheralContext<'_>) -> SimResult<()> {
        match AdcRegister::from_index(reg) {
            Some(AdcRegister::Admux) => self.admux = value,
            Some(AdcRegister::Adcsr) => self.write_adcsr(value, ctx),
            Some(reg @ (AdcRegister::Adch | AdcRegister::Adcl)) => {
                tracing::warn!("Write {:#04x} to {:?} ignored: not supported", value, reg);
            }
            None => {}
        }
        Ok(())
    }

    fn tick(&mut self, ctx: &mut PeripheralContext<'_>) -> PeripheralTickResult {
        if self.adcsr & ADEN == 0 {
            self.prescaler = 0;
            self.clk = 0;
            return PeripheralTickResult::default();
        }

        self.prescaler += 1;
        if self.prescaler >= 128 {
            self.prescaler = 0;
        }

        let old_clk = self.clk;
        if self.prescaler % self.divider() == 0 {
            self.clk = self.clk.wrapping_add(1);
        }
        if self.clk != old_clk {
            self.on_half_clock(ctx);
        }

        PeripheralTickResult::default()
    }

    fn reset(&mut self, _ctx: &mut PeripheralContext<'_>) {
        self.admux = 0;
        self.adcsr = 0;
        self.state = ConversionState::Idle;
        self.prescaler = 0;
        self.clk = 0;
        self.used_before = false;
        self.adch_locked = false;
    }

    fn interrupt_started(&mut self, vector: usize, ctx: &mut PeripheralContext<'_>) {
        if vector == self.vector {
            self.adcsr &= !ADIF;
            ctx.irq.clear_pending(vector);
        }
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }
    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
