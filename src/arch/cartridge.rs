use tracing::{debug, info};
use crate::arch::error::NesError;
use crate::arch::mappers::{self, Buses, MapperRef};
use crate::arch::rom::RomImage;

/// The cartridge slot. Holds at most one board, wired into both buses.
#[derive(Debug, Default)]
pub struct Cartridge {
    mapper: Option<MapperRef>,
    mapper_id: Option<u16>,
}
impl Cartridge {
    pub const NAME: &'static str = "Cartridge";

    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in the board `rom` asks for. An unsupported mapper or a segment
    /// the board cannot hold is rejected before the current board is touched.
    pub fn insert(&mut self, rom: &dyn RomImage, buses: &Buses) -> Result<(), NesError> {
        let id = rom.mapper();
        mappers::validate(id, rom)?;

        self.eject();
        let mapper = mappers::construct(id, rom, buses)?;
        info!(
            "inserted {} cartridge: mapper {id}.{}, {}K PRG ROM, {}K CHR {}, {:?} mirroring",
            rom.format(),
            rom.submapper(),
            rom.prg_rom_size() / 1024,
            rom.chr_rom_size().max(rom.chr_ram_size()) / 1024,
            if rom.chr_rom_size() == 0 { "RAM" } else { "ROM" },
            rom.mirroring(),
        );
        self.mapper = Some(mapper);
        self.mapper_id = Some(id);

        Ok(())
    }

    /// Detach the current board, if any.
    pub fn eject(&mut self) {
        if let Some(mapper) = self.mapper.take() {
            debug!("ejecting mapper {:?}", self.mapper_id);
            mapper.borrow_mut().dispose();
        }
        self.mapper_id = None;
    }

    pub fn is_loaded(&self) -> bool {
        self.mapper.is_some()
    }

    pub fn mapper_id(&self) -> Option<u16> {
        self.mapper_id
    }

    pub fn mapper(&self) -> Option<&MapperRef> {
        self.mapper.as_ref()
    }
}
