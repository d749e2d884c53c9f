//! Reader control command codes
//!
//! Callers name control commands by a logical id. The code handed to the
//! middleware depends on the platform's PC/SC flavour.

/// Middleware flavour determining the control code encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlPlatform {
    /// WinSCard: `SCARD_CTL_CODE(id)`, a `FILE_DEVICE_SMARTCARD` IOCTL
    Windows,
    /// pcsc-lite: `0x42000000 + id`
    Posix,
}

impl ControlPlatform {
    /// Platform this binary was built for
    pub const fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Posix
        }
    }

    /// Encode the logical control command `command_id`
    pub const fn control_code(self, command_id: u32) -> u32 {
        match self {
            Self::Windows => 0x0031_0000 | (command_id << 2),
            Self::Posix => 0x4200_0000 | command_id,
        }
    }

    /// Logical id of the CCID escape command
    pub const fn ccid_escape_command_id(self) -> u32 {
        match self {
            Self::Windows => 3500,
            Self::Posix => 1,
        }
    }
}

impl Default for ControlPlatform {
    fn default() -> Self {
        Self::current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ccid_escape_codes() {
        let windows = ControlPlatform::Windows;
        assert_eq!(
            windows.control_code(windows.ccid_escape_command_id()),
            0x0031_36B0
        );

        let posix = ControlPlatform::Posix;
        assert_eq!(posix.control_code(posix.ccid_escape_command_id()), 0x4200_0001);
    }

    #[test]
    fn test_arbitrary_ids() {
        assert_eq!(ControlPlatform::Windows.control_code(1), 0x0031_0004);
        assert_eq!(ControlPlatform::Posix.control_code(3500), 0x4200_0DAC);
    }
}
