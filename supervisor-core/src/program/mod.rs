//! The program record and its start-request protocol.
//!
//! There is exactly one [`ProgramDescriptor`] per hub. Every start request,
//! whether it comes from the button, the boot sequence, a remote host, or a
//! restart, goes through [`ProgramManager::request_start`], which is the only
//! place the requested id and request type are written.

use core::fmt;

use crate::status::{StatusFlag, StatusObserver, StatusRegistry};

/// Number of user program slots addressable by a [`ProgramId`].
pub const MAX_SLOTS: u8 = 5;

const BUILTIN_BASE: u8 = 0x80;

/// Identifier of a program the hub can run.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProgramId(u8);

impl ProgramId {
    /// First user slot; the default program at boot.
    pub const FIRST_SLOT: Self = Self(0);
    /// Builtin interactive prompt.
    pub const REPL: Self = Self(BUILTIN_BASE);
    /// Builtin port monitor.
    pub const PORT_VIEW: Self = Self(BUILTIN_BASE + 1);

    /// Returns the id of user slot `index`, or `None` past [`MAX_SLOTS`].
    #[must_use]
    pub const fn slot(index: u8) -> Option<Self> {
        if index < MAX_SLOTS {
            Some(Self(index))
        } else {
            None
        }
    }

    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn as_raw(self) -> u8 {
        self.0
    }

    /// Slot index for user programs.
    #[must_use]
    pub const fn slot_index(self) -> Option<u8> {
        if self.is_builtin() {
            None
        } else {
            Some(self.0)
        }
    }

    #[must_use]
    pub const fn is_builtin(self) -> bool {
        self.0 >= BUILTIN_BASE
    }
}

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::REPL => f.write_str("repl"),
            Self::PORT_VIEW => f.write_str("port-view"),
            Self(raw) if raw >= BUILTIN_BASE => write!(f, "builtin(0x{raw:02x})"),
            Self(slot) => write!(f, "slot {slot}"),
        }
    }
}

/// Origin of a pending start request. `None` means nothing is pending.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StartRequestType {
    #[default]
    None,
    Boot,
    HubUi,
    Remote,
}

impl StartRequestType {
    #[must_use]
    pub const fn is_pending(self) -> bool {
        !matches!(self, StartRequestType::None)
    }
}

impl fmt::Display for StartRequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StartRequestType::None => "none",
            StartRequestType::Boot => "boot",
            StartRequestType::HubUi => "hub-ui",
            StartRequestType::Remote => "remote",
        };
        f.write_str(label)
    }
}

/// Location of a program image in storage. A zero length means the slot is empty.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProgramImage {
    pub offset: u32,
    pub len: u32,
}

impl ProgramImage {
    pub const EMPTY: Self = Self { offset: 0, len: 0 };

    #[must_use]
    pub const fn new(offset: u32, len: u32) -> Self {
        Self { offset, len }
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.len == 0
    }
}

/// The single record describing the requested or running program.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProgramDescriptor {
    pub id: ProgramId,
    pub start_request_type: StartRequestType,
    pub image: ProgramImage,
}

impl ProgramDescriptor {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            id: ProgramId::FIRST_SLOT,
            start_request_type: StartRequestType::None,
            image: ProgramImage::EMPTY,
        }
    }
}

/// Reasons a start request is rejected.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProgramError {
    /// A program is running or another request is already pending.
    Busy,
    /// The validator refused the program.
    NotSupported,
}

impl fmt::Display for ProgramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Fills in the storage-derived fields of a descriptor for its `id`.
pub trait ProgramStorage {
    fn load_program(&mut self, program: &mut ProgramDescriptor);
}

/// Decides whether a loaded program may run on this hub.
pub trait ProgramValidator {
    /// # Errors
    ///
    /// Returns [`ProgramError::NotSupported`] when the program cannot run.
    fn validate(&self, program: &ProgramDescriptor) -> Result<(), ProgramError>;
}

/// Owns the program descriptor and enforces the start-request protocol.
#[derive(Debug, Default)]
pub struct ProgramManager {
    program: ProgramDescriptor,
}

impl ProgramManager {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            program: ProgramDescriptor::new(),
        }
    }

    #[must_use]
    pub const fn descriptor(&self) -> &ProgramDescriptor {
        &self.program
    }

    #[must_use]
    pub const fn start_request_type(&self) -> StartRequestType {
        self.program.start_request_type
    }

    #[must_use]
    pub const fn start_requested(&self) -> bool {
        self.program.start_request_type.is_pending()
    }

    /// Requests that program `id` runs at the next opportunity.
    ///
    /// The candidate is loaded and validated before anything is recorded, so
    /// a rejected request leaves the previous descriptor untouched and never
    /// leaves a request pending.
    ///
    /// # Errors
    ///
    /// [`ProgramError::Busy`] while a program runs or a request is pending;
    /// [`ProgramError::NotSupported`] when the validator refuses the program
    /// or `request_type` is [`StartRequestType::None`].
    pub fn request_start<H, O>(
        &mut self,
        id: ProgramId,
        request_type: StartRequestType,
        status: &StatusRegistry<O>,
        store: &mut H,
    ) -> Result<(), ProgramError>
    where
        H: ProgramStorage + ProgramValidator + ?Sized,
        O: StatusObserver,
    {
        if status.test(StatusFlag::UserProgramRunning) || self.start_requested() {
            return Err(ProgramError::Busy);
        }
        if !request_type.is_pending() {
            return Err(ProgramError::NotSupported);
        }

        let mut candidate = ProgramDescriptor {
            id,
            ..ProgramDescriptor::new()
        };
        store.load_program(&mut candidate);
        store.validate(&candidate)?;

        candidate.start_request_type = request_type;
        self.program = candidate;
        Ok(())
    }

    /// Withdraws the pending request and returns the type it had.
    pub fn clear_request(&mut self) -> StartRequestType {
        core::mem::take(&mut self.program.start_request_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Timestamp;

    struct SlotStore {
        images: [ProgramImage; MAX_SLOTS as usize],
        loads: usize,
    }

    impl SlotStore {
        fn with_slot(slot: usize, len: u32) -> Self {
            let mut images = [ProgramImage::EMPTY; MAX_SLOTS as usize];
            images[slot] = ProgramImage::new(0x100, len);
            Self { images, loads: 0 }
        }
    }

    impl ProgramStorage for SlotStore {
        fn load_program(&mut self, program: &mut ProgramDescriptor) {
            self.loads += 1;
            if let Some(index) = program.id.slot_index() {
                program.image = self.images[usize::from(index)];
            }
        }
    }

    impl ProgramValidator for SlotStore {
        fn validate(&self, program: &ProgramDescriptor) -> Result<(), ProgramError> {
            if program.id.is_builtin() || !program.image.is_empty() {
                Ok(())
            } else {
                Err(ProgramError::NotSupported)
            }
        }
    }

    #[test]
    fn accepted_request_records_type_and_image() {
        let status = StatusRegistry::new();
        let mut store = SlotStore::with_slot(0, 64);
        let mut manager = ProgramManager::new();

        manager
            .request_start(ProgramId::FIRST_SLOT, StartRequestType::HubUi, &status, &mut store)
            .expect("slot 0 holds a program");

        assert_eq!(manager.start_request_type(), StartRequestType::HubUi);
        assert_eq!(manager.descriptor().image, ProgramImage::new(0x100, 64));
    }

    #[test]
    fn pending_request_makes_later_requests_busy() {
        let status = StatusRegistry::new();
        let mut store = SlotStore::with_slot(0, 64);
        let mut manager = ProgramManager::new();
        manager
            .request_start(ProgramId::FIRST_SLOT, StartRequestType::Boot, &status, &mut store)
            .expect("first request accepted");

        let before = *manager.descriptor();
        let result =
            manager.request_start(ProgramId::REPL, StartRequestType::Remote, &status, &mut store);

        assert_eq!(result, Err(ProgramError::Busy));
        assert_eq!(*manager.descriptor(), before);
        assert_eq!(store.loads, 1);
    }

    #[test]
    fn running_program_makes_requests_busy() {
        let mut status = StatusRegistry::new();
        status.set(StatusFlag::UserProgramRunning, Timestamp::ZERO);
        let mut store = SlotStore::with_slot(0, 64);
        let mut manager = ProgramManager::new();

        let result = manager.request_start(
            ProgramId::FIRST_SLOT,
            StartRequestType::HubUi,
            &status,
            &mut store,
        );

        assert_eq!(result, Err(ProgramError::Busy));
        assert!(!manager.start_requested());
    }

    #[test]
    fn rejected_program_leaves_nothing_pending() {
        let status = StatusRegistry::new();
        let mut store = SlotStore::with_slot(0, 64);
        let mut manager = ProgramManager::new();

        let result = manager.request_start(
            ProgramId::from_raw(3),
            StartRequestType::HubUi,
            &status,
            &mut store,
        );

        assert_eq!(result, Err(ProgramError::NotSupported));
        assert_eq!(manager.start_request_type(), StartRequestType::None);
        assert_eq!(*manager.descriptor(), ProgramDescriptor::new());
    }

    #[test]
    fn clear_request_returns_previous_type() {
        let status = StatusRegistry::new();
        let mut store = SlotStore::with_slot(0, 64);
        let mut manager = ProgramManager::new();
        manager
            .request_start(ProgramId::FIRST_SLOT, StartRequestType::Remote, &status, &mut store)
            .expect("request accepted");

        assert_eq!(manager.clear_request(), StartRequestType::Remote);
        assert!(!manager.start_requested());
        assert_eq!(manager.descriptor().id, ProgramId::FIRST_SLOT);
    }

    #[test]
    fn program_ids_render_by_kind() {
        assert_eq!(ProgramId::FIRST_SLOT.to_string(), "slot 0");
        assert_eq!(ProgramId::REPL.to_string(), "repl");
        assert_eq!(ProgramId::slot(MAX_SLOTS), None);
    }
}
