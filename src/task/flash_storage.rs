//! Persistent tuning parameters and convoy group configuration
//!
//! Both records live in the last two flash sectors, managed by the
//! `sequential-storage` map so every save is wear levelled and a torn write
//! never corrupts the previous record. The reserved range must match memory.x.
//!
//! Main loads both records once at boot through [`ParamStore`], then hands the
//! store to the [`flash_storage`] task which serves save and clear requests for
//! the rest of the uptime and reports each outcome to the UI.

use balance_convoy::convoy::GroupConfig;
use balance_convoy::params::ParamSet;
use balance_convoy::protocol::link_frame::{Outbound, StorageOp};
use defmt::*;
use embassy_rp::flash::{Async, Flash, ERASE_SIZE};
use embassy_rp::peripherals::FLASH;
use sequential_storage::{
    cache::NoCache,
    map::{fetch_item, remove_item, store_item, Key, SerializationError, Value},
};

use crate::system::channels::{try_send_outbound, StorageRequest, STORAGE_REQUESTS};
use crate::system::resources::StorageResources;

/// Total flash size of the board
pub const FLASH_SIZE: usize = 2048 * 1024;

/// Number of sectors to use for storage (2 sectors for wear leveling)
const STORAGE_SECTOR_COUNT: usize = 2;

const STORAGE_SIZE: usize = ERASE_SIZE * STORAGE_SECTOR_COUNT;

/// Storage offset from the start of flash, the last 8 KiB
const STORAGE_OFFSET: u32 = (FLASH_SIZE - STORAGE_SIZE) as u32;

type BoardFlash = Flash<'static, FLASH, Async, FLASH_SIZE>;

/// Storage keys for sequential-storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
enum StorageKey {
    Params = 0,
    GroupConfig = 1,
}

impl Key for StorageKey {
    fn serialize_into(&self, buffer: &mut [u8]) -> Result<usize, SerializationError> {
        if buffer.is_empty() {
            return Err(SerializationError::BufferTooSmall);
        }
        buffer[0] = *self as u8;
        Ok(1)
    }

    fn deserialize_from(buffer: &[u8]) -> Result<(Self, usize), SerializationError>
    where
        Self: Sized,
    {
        match buffer.first() {
            None => Err(SerializationError::BufferTooSmall),
            Some(0) => Ok((StorageKey::Params, 1)),
            Some(1) => Ok((StorageKey::GroupConfig, 1)),
            Some(_) => Err(SerializationError::InvalidFormat),
        }
    }
}

/// Stored form of [`ParamSet`]
struct StoredParams(ParamSet);

impl Value<'_> for StoredParams {
    fn serialize_into(&self, buffer: &mut [u8]) -> Result<usize, SerializationError> {
        let bytes = self.0.to_bytes();
        let target = buffer
            .get_mut(..bytes.len())
            .ok_or(SerializationError::BufferTooSmall)?;
        target.copy_from_slice(&bytes);
        Ok(bytes.len())
    }

    fn deserialize_from(buffer: &[u8]) -> Result<Self, SerializationError>
    where
        Self: Sized,
    {
        if buffer.len() < ParamSet::STORED_LEN {
            return Err(SerializationError::BufferTooSmall);
        }
        ParamSet::from_bytes(buffer)
            .map(StoredParams)
            .ok_or(SerializationError::InvalidData)
    }
}

/// Stored form of [`GroupConfig`]
struct StoredGroupConfig(GroupConfig);

impl Value<'_> for StoredGroupConfig {
    fn serialize_into(&self, buffer: &mut [u8]) -> Result<usize, SerializationError> {
        let bytes = self.0.to_bytes();
        let target = buffer
            .get_mut(..bytes.len())
            .ok_or(SerializationError::BufferTooSmall)?;
        target.copy_from_slice(&bytes);
        Ok(bytes.len())
    }

    fn deserialize_from(buffer: &[u8]) -> Result<Self, SerializationError>
    where
        Self: Sized,
    {
        if buffer.len() < GroupConfig::STORED_LEN {
            return Err(SerializationError::BufferTooSmall);
        }
        GroupConfig::from_bytes(buffer)
            .map(StoredGroupConfig)
            .ok_or(SerializationError::InvalidData)
    }
}

/// Flash with the map bookkeeping around it
pub struct ParamStore {
    flash: BoardFlash,
    cache: NoCache,
    buffer: [u8; 128],
}

impl ParamStore {
    pub fn new(r: StorageResources) -> Self {
        Self {
            flash: Flash::new(r.flash, r.dma),
            cache: NoCache::new(),
            buffer: [0; 128],
        }
    }

    fn range() -> core::ops::Range<u32> {
        STORAGE_OFFSET..(STORAGE_OFFSET + STORAGE_SIZE as u32)
    }

    /// Loads the tuning parameters, falling back to the defaults
    pub async fn load_params(&mut self) -> ParamSet {
        match fetch_item::<StorageKey, StoredParams, _>(
            &mut self.flash,
            Self::range(),
            &mut self.cache,
            &mut self.buffer,
            &StorageKey::Params,
        )
        .await
        {
            Ok(Some(StoredParams(params))) => {
                info!("Parameters loaded, pitch zero {}", params.pitch_zero);
                params
            }
            Ok(None) => {
                info!("No stored parameters, using defaults");
                ParamSet::default()
            }
            Err(e) => {
                error!("Failed to load parameters: {}", defmt::Debug2Format(&e));
                ParamSet::default()
            }
        }
    }

    /// Loads the convoy group configuration, falling back to standalone
    pub async fn load_group_config(&mut self) -> GroupConfig {
        match fetch_item::<StorageKey, StoredGroupConfig, _>(
            &mut self.flash,
            Self::range(),
            &mut self.cache,
            &mut self.buffer,
            &StorageKey::GroupConfig,
        )
        .await
        {
            Ok(Some(StoredGroupConfig(config))) => {
                info!("Group config loaded: {}", config);
                config
            }
            Ok(None) => {
                info!("No stored group config, running standalone");
                GroupConfig::standalone()
            }
            Err(e) => {
                error!("Failed to load group config: {}", defmt::Debug2Format(&e));
                GroupConfig::standalone()
            }
        }
    }

    /// Returns whether the record reached flash
    pub async fn save_params(&mut self, params: ParamSet) -> bool {
        match store_item(
            &mut self.flash,
            Self::range(),
            &mut self.cache,
            &mut self.buffer,
            &StorageKey::Params,
            &StoredParams(params),
        )
        .await
        {
            Ok(()) => {
                info!("Parameters saved");
                true
            }
            Err(e) => {
                error!("Failed to save parameters: {}", defmt::Debug2Format(&e));
                false
            }
        }
    }

    pub async fn save_group_config(&mut self, config: GroupConfig) -> bool {
        match store_item(
            &mut self.flash,
            Self::range(),
            &mut self.cache,
            &mut self.buffer,
            &StorageKey::GroupConfig,
            &StoredGroupConfig(config),
        )
        .await
        {
            Ok(()) => {
                info!("Group config saved, reboot to apply");
                true
            }
            Err(e) => {
                error!("Failed to save group config: {}", defmt::Debug2Format(&e));
                false
            }
        }
    }

    /// Drops the stored parameters; the group configuration is kept
    ///
    /// Clearing when nothing is stored succeeds.
    pub async fn clear_params(&mut self) -> bool {
        match remove_item::<StorageKey, _>(
            &mut self.flash,
            Self::range(),
            &mut self.cache,
            &mut self.buffer,
            &StorageKey::Params,
        )
        .await
        {
            Ok(()) => {
                info!("Stored parameters cleared");
                true
            }
            Err(e) => {
                error!("Failed to clear parameters: {}", defmt::Debug2Format(&e));
                false
            }
        }
    }
}

/// Serves flash writes for the lifetime of the firmware
#[embassy_executor::task]
pub async fn flash_storage(mut store: ParamStore) {
    info!("Flash storage task started");

    loop {
        let request = STORAGE_REQUESTS.receive().await;
        debug!("Storage request: {:?}", request);

        let (op, ok) = match request {
            StorageRequest::SaveParams(params) => (StorageOp::SaveParams, store.save_params(params).await),
            StorageRequest::ClearParams => (StorageOp::ClearParams, store.clear_params().await),
            StorageRequest::SaveGroupConfig(config) => {
                (StorageOp::SaveGroupConfig, store.save_group_config(config).await)
            }
        };
        try_send_outbound(Outbound::StorageStatus { op, ok });
    }
}
