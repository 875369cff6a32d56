//! Wire protocol for the WUP-028 GameCube controller adapter.
//!
//! The adapter speaks a fixed vendor protocol over two interrupt
//! endpoints: a 37-byte input report (1 header byte + four 9-byte port
//! records) and two tiny output payloads (`0x13` to start streaming,
//! `0x11` + four command bytes for rumble). All values confirmed
//! against real hardware captures; they must match exactly.

// ── USB identifiers ──

/// Nintendo vendor ID.
pub const VENDOR_ID: u16 = 0x057e;

/// WUP-028 adapter product ID.
pub const PRODUCT_ID: u16 = 0x0337;

/// Number of logical controller ports on the adapter.
pub const PORT_COUNT: usize = 4;

// ── Payload framing ──

/// Size of one input interrupt transfer.
pub const INPUT_PAYLOAD_SIZE: usize = 37;

/// Size of one per-port record inside the input payload.
pub const PORT_RECORD_SIZE: usize = 9;

/// First byte of every valid input payload (USB HID descriptor type).
pub const INPUT_HEADER_MARKER: u8 = 0x21;

/// One-shot payload that switches the adapter into streaming mode.
pub const INIT_PAYLOAD: [u8; 1] = [0x13];

/// Opcode byte of the rumble output payload.
pub const RUMBLE_OPCODE: u8 = 0x11;

/// Size of the rumble output payload (opcode + 4 command bytes).
pub const RUMBLE_PAYLOAD_SIZE: usize = 5;

/// Timeout for a single interrupt transfer, in milliseconds.
///
/// Short enough that a cleared run flag is observed within one read
/// attempt during shutdown.
pub const TRANSFER_TIMEOUT_MS: u64 = 16;

// ── Button bits ──
//
// Bit layout of [`PadState::buttons`]; matches the GameCube serial
// interface ordering so upstream consumers can use the value directly.

pub const BUTTON_LEFT: u16 = 0x0001;
pub const BUTTON_RIGHT: u16 = 0x0002;
pub const BUTTON_DOWN: u16 = 0x0004;
pub const BUTTON_UP: u16 = 0x0008;
pub const TRIGGER_Z: u16 = 0x0010;
pub const TRIGGER_R: u16 = 0x0020;
pub const TRIGGER_L: u16 = 0x0040;
pub const BUTTON_A: u16 = 0x0100;
pub const BUTTON_B: u16 = 0x0200;
pub const BUTTON_X: u16 = 0x0400;
pub const BUTTON_Y: u16 = 0x0800;
pub const BUTTON_START: u16 = 0x1000;

/// One-shot flag: the controller on this port just became present and
/// its current analog values should be taken as the calibration origin.
pub const GET_ORIGIN: u16 = 0x2000;

/// Desync-detection flag: no adapter-backed controller on this port.
pub const ERR_STATUS: u16 = 0x8000;

// ── Controller type ──

/// Kind of controller attached to a port, from the top nibble of the
/// first byte of its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerType {
    #[default]
    None,
    Wired,
    Wireless,
}

impl ControllerType {
    /// Decode the type nibble. `0` is empty, `2` is a wireless
    /// (WaveBird) receiver, any other non-zero value reports wired.
    pub fn from_nibble(nibble: u8) -> Self {
        match nibble {
            0 => ControllerType::None,
            2 => ControllerType::Wireless,
            _ => ControllerType::Wired,
        }
    }

    /// Whether a controller is present at all.
    pub fn is_connected(self) -> bool {
        self != ControllerType::None
    }
}

// ── Pad state ──

/// Decoded state of one controller port.
///
/// Analog values are raw device bytes (0–255); no calibration or
/// deadzone is applied at this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PadState {
    pub buttons: u16,
    pub stick_x: u8,
    pub stick_y: u8,
    pub substick_x: u8,
    pub substick_y: u8,
    pub trigger_left: u8,
    pub trigger_right: u8,
}

// ── Decode / encode ──

/// Whether a raw read looks like a complete input payload.
///
/// `size` is the byte count reported by the transfer; a short read or a
/// wrong header marker means "no valid frame yet", not an error.
pub fn payload_valid(payload: &[u8], size: usize) -> bool {
    size == INPUT_PAYLOAD_SIZE
        && payload.len() >= INPUT_PAYLOAD_SIZE
        && payload[0] == INPUT_HEADER_MARKER
}

/// The 9-byte record for `port` within a full input payload.
pub fn port_record(payload: &[u8; INPUT_PAYLOAD_SIZE], port: usize) -> &[u8] {
    let start = 1 + PORT_RECORD_SIZE * port;
    &payload[start..start + PORT_RECORD_SIZE]
}

/// Controller type reported by a port record.
pub fn record_type(record: &[u8]) -> ControllerType {
    ControllerType::from_nibble(record[0] >> 4)
}

/// Decode buttons and analog axes from a 9-byte port record.
///
/// Pure and idempotent; origin/error flags are owned by the caller.
pub fn decode_record(record: &[u8]) -> PadState {
    debug_assert_eq!(record.len(), PORT_RECORD_SIZE);

    let b1 = record[1];
    let b2 = record[2];

    let mut buttons = 0u16;
    if b1 & (1 << 0) != 0 {
        buttons |= BUTTON_A;
    }
    if b1 & (1 << 1) != 0 {
        buttons |= BUTTON_B;
    }
    if b1 & (1 << 2) != 0 {
        buttons |= BUTTON_X;
    }
    if b1 & (1 << 3) != 0 {
        buttons |= BUTTON_Y;
    }
    if b1 & (1 << 4) != 0 {
        buttons |= BUTTON_LEFT;
    }
    if b1 & (1 << 5) != 0 {
        buttons |= BUTTON_RIGHT;
    }
    if b1 & (1 << 6) != 0 {
        buttons |= BUTTON_DOWN;
    }
    if b1 & (1 << 7) != 0 {
        buttons |= BUTTON_UP;
    }
    if b2 & (1 << 0) != 0 {
        buttons |= BUTTON_START;
    }
    if b2 & (1 << 1) != 0 {
        buttons |= TRIGGER_Z;
    }
    if b2 & (1 << 2) != 0 {
        buttons |= TRIGGER_R;
    }
    if b2 & (1 << 3) != 0 {
        buttons |= TRIGGER_L;
    }

    PadState {
        buttons,
        stick_x: record[3],
        stick_y: record[4],
        substick_x: record[5],
        substick_y: record[6],
        trigger_left: record[7],
        trigger_right: record[8],
    }
}

/// Encode a 9-byte port record from a pad state and controller type.
///
/// Inverse of [`decode_record`]; used to build synthetic payloads for
/// tests and tooling. Origin/error flags are not representable on the
/// wire and are ignored.
pub fn encode_record(kind: ControllerType, pad: &PadState) -> [u8; PORT_RECORD_SIZE] {
    let type_nibble: u8 = match kind {
        ControllerType::None => 0,
        ControllerType::Wired => 1,
        ControllerType::Wireless => 2,
    };

    let mut b1 = 0u8;
    let mut b2 = 0u8;
    if pad.buttons & BUTTON_A != 0 {
        b1 |= 1 << 0;
    }
    if pad.buttons & BUTTON_B != 0 {
        b1 |= 1 << 1;
    }
    if pad.buttons & BUTTON_X != 0 {
        b1 |= 1 << 2;
    }
    if pad.buttons & BUTTON_Y != 0 {
        b1 |= 1 << 3;
    }
    if pad.buttons & BUTTON_LEFT != 0 {
        b1 |= 1 << 4;
    }
    if pad.buttons & BUTTON_RIGHT != 0 {
        b1 |= 1 << 5;
    }
    if pad.buttons & BUTTON_DOWN != 0 {
        b1 |= 1 << 6;
    }
    if pad.buttons & BUTTON_UP != 0 {
        b1 |= 1 << 7;
    }
    if pad.buttons & BUTTON_START != 0 {
        b2 |= 1 << 0;
    }
    if pad.buttons & TRIGGER_Z != 0 {
        b2 |= 1 << 1;
    }
    if pad.buttons & TRIGGER_R != 0 {
        b2 |= 1 << 2;
    }
    if pad.buttons & TRIGGER_L != 0 {
        b2 |= 1 << 3;
    }

    [
        type_nibble << 4,
        b1,
        b2,
        pad.stick_x,
        pad.stick_y,
        pad.substick_x,
        pad.substick_y,
        pad.trigger_left,
        pad.trigger_right,
    ]
}

/// Build a full 37-byte input payload from four port records.
pub fn encode_payload(records: &[[u8; PORT_RECORD_SIZE]; PORT_COUNT]) -> [u8; INPUT_PAYLOAD_SIZE] {
    let mut payload = [0u8; INPUT_PAYLOAD_SIZE];
    payload[0] = INPUT_HEADER_MARKER;
    for (port, record) in records.iter().enumerate() {
        let start = 1 + PORT_RECORD_SIZE * port;
        payload[start..start + PORT_RECORD_SIZE].copy_from_slice(record);
    }
    payload
}

/// Build the 5-byte rumble payload from the staged per-port commands.
pub fn rumble_payload(commands: &[u8; PORT_COUNT]) -> [u8; RUMBLE_PAYLOAD_SIZE] {
    [
        RUMBLE_OPCODE,
        commands[0],
        commands[1],
        commands[2],
        commands[3],
    ]
}
