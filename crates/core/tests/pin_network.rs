use avrsim_config::ChipDescriptor;
use avrsim_core::signals::{DriveState, Level};
use avrsim_core::system::build_device;
use avrsim_core::{AvrDevice, DebugControl};

const ATMEGA16: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../configs/chips/atmega16.yaml");

const PINA: u32 = 0x39;
const DDRA: u32 = 0x3A;
const PORTB: u32 = 0x38;
const DDRB: u32 = 0x37;
const PINB: u32 = 0x36;

fn wired_device() -> anyhow::Result<AvrDevice> {
    let chip = ChipDescriptor::from_file(ATMEGA16)?;
    let mut device = build_device(&chip)?;
    let a0 = device.pin("A0")?;
    let b0 = device.pin("B0")?;
    device.bus.signals.connect(a0, b0);
    device.bus.propagate_signals();
    Ok(device)
}

fn peek(device: &mut AvrDevice, addr: u32) -> anyhow::Result<u8> {
    Ok(device.read_memory(addr, 1)?[0])
}

#[test]
fn test_output_drives_connected_input() -> anyhow::Result<()> {
    let mut device = wired_device()?;

    device.write_memory(DDRB, &[0x01])?;
    device.write_memory(PORTB, &[0x01])?;
    assert_eq!(peek(&mut device, PINA)? & 0x01, 0x01);

    device.write_memory(PORTB, &[0x00])?;
    assert_eq!(peek(&mut device, PINA)? & 0x01, 0x00);
    Ok(())
}

#[test]
fn test_pull_up_and_floating_inputs() -> anyhow::Result<()> {
    let mut device = wired_device()?;
    let b0 = device.pin("B0")?;

    // input with PORT bit set enables the pull-up
    device.write_memory(PORTB, &[0x01])?;
    assert_eq!(device.bus.signals.pin(b0).drive(), DriveState::PullUp);
    assert_eq!(device.bus.signals.resolve(b0), Level::High);
    assert_eq!(peek(&mut device, PINA)? & 0x01, 0x01);

    // nobody drives the net
    device.write_memory(PORTB, &[0x00])?;
    assert_eq!(device.bus.signals.resolve(b0), Level::Floating);
    assert_eq!(peek(&mut device, PINA)? & 0x01, 0x00);
    Ok(())
}

#[test]
fn test_strong_driver_beats_pull_up() -> anyhow::Result<()> {
    let mut device = wired_device()?;
    device.write_memory(PORTB, &[0x01])?;
    device.write_memory(DDRA, &[0x01])?;
    assert_eq!(peek(&mut device, PINB)? & 0x01, 0x00);
    Ok(())
}

#[test]
fn test_pin_register_ignores_writes() -> anyhow::Result<()> {
    let mut device = wired_device()?;
    device.write_memory(PINB, &[0xFF])?;
    assert_eq!(peek(&mut device, PINB)?, 0x00);
    Ok(())
}

#[test]
fn test_port_drive_string() -> anyhow::Result<()> {
    let mut device = wired_device()?;
    device.write_memory(DDRB, &[0x0F])?;
    device.write_memory(PORTB, &[0x35])?;
    let port = device.bus.port("B").expect("port B");
    assert_eq!(port.pin_string(&device.bus.signals), "tthhLHLH");
    Ok(())
}

#[test]
fn test_reset_releases_port_pins() -> anyhow::Result<()> {
    let mut device = wired_device()?;
    device.write_memory(DDRB, &[0x01])?;
    device.write_memory(PORTB, &[0x01])?;
    device.reset();

    let b0 = device.pin("B0")?;
    assert_eq!(device.bus.signals.pin(b0).drive(), DriveState::Tristate);
    assert_eq!(peek(&mut device, PINA)? & 0x01, 0x00);
    // the connection itself survives
    let a0 = device.pin("A0")?;
    assert_eq!(device.bus.signals.pin(a0).net(), device.bus.signals.pin(b0).net());
    Ok(())
}
