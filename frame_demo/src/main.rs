//! Frame loop demo
//!
//! Runs the engine's frame loop without a window: every frame pushes the
//! kind of scratch data a renderer hands to the graphics API into the
//! temporary arena, does nested scratch work on the stack, and churns
//! entities through the pool-backed lookup table.
//!
//! Usage: `frame_demo [config.toml|config.ron]`

use std::ffi::{c_char, CStr};

use bytemuck::{Pod, Zeroable};
use engine_memory::foundation::logging;
use engine_memory::prelude::*;
use serde::{Deserialize, Serialize};

/// Demo settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct DemoConfig {
    memory: MemoryConfig,
    frames: u64,
    entities_per_frame: u32,
    entity_lifetime: u32,
    log_every: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            memory: MemoryConfig::default(),
            frames: 120,
            entities_per_frame: 4,
            entity_lifetime: 20,
            log_every: 30,
        }
    }
}

impl Config for DemoConfig {}

/// Same layout as a C `VkQueueFamilyProperties`-style record
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct QueueFamily {
    flags: u32,
    queue_count: u32,
    timestamp_valid_bits: u32,
    min_granularity: [u32; 3],
}

const GRAPHICS_BIT: u32 = 0x1;
const TRANSFER_BIT: u32 = 0x4;

const EXTENSIONS: [&str; 3] = ["VK_KHR_surface", "VK_KHR_swapchain", "VK_EXT_debug_utils"];

const TRANSFORM: u8 = 0;
const RENDERABLE: u8 = 1;
const VELOCITY: u8 = 2;

struct FrameDemo<'p> {
    settings: DemoConfig,
    app_name: Option<ArenaString<'p>>,
    entities: Option<EntityLookupTable<'p>>,
    spawned: u32,
}

impl FrameDemo<'_> {
    fn new(settings: DemoConfig) -> Self {
        Self {
            settings,
            app_name: None,
            entities: None,
            spawned: 0,
        }
    }

    fn pick_graphics_queue(frame: &Frame<'_>) -> Option<usize> {
        let families = frame.temporary().push_zeroed_slice::<QueueFamily>(4);
        for (i, family) in families.iter_mut().enumerate() {
            family.flags = if i % 2 == 0 { GRAPHICS_BIT | TRANSFER_BIT } else { TRANSFER_BIT };
            family.queue_count = 1 + i as u32;
        }
        families.iter().position(|f| f.flags & GRAPHICS_BIT != 0)
    }

    fn extension_names<'f>(frame: &Frame<'f>) -> ArenaVec<'f, *const c_char> {
        let temporary = frame.temporary();
        let mut names = temporary.new_vec();
        for extension in EXTENSIONS {
            let name: &CStr = ArenaString::new(temporary, extension).to_c_str(temporary);
            names.push(name.as_ptr());
        }
        names
    }

    fn scratch_work(frame: &Frame<'_>) -> Result<f32, AppError> {
        let scratch = frame.scratch();
        let mut weights = scratch.allocate_array::<f32>(64)?;
        for (i, w) in weights.iter_mut().enumerate() {
            *w = i as f32 / 64.0;
        }
        let total = {
            let mut partial = scratch.allocate_array::<f32>(8)?;
            for (chunk, sum) in weights.chunks(8).zip(partial.iter_mut()) {
                *sum = chunk.iter().sum();
            }
            let total: f32 = partial.iter().sum();
            total
        };
        Ok(total)
    }

    fn churn_entities(&mut self, frame_index: u64) -> Result<(), AppError> {
        let Some(table) = self.entities.as_mut() else {
            return Err(AppError::Custom("update before initialize".to_string()));
        };

        let per_frame = self.settings.entities_per_frame;
        for _ in 0..per_frame {
            let components = ComponentSet::empty()
                .with(TRANSFORM)
                .with(if self.spawned % 3 == 0 { VELOCITY } else { RENDERABLE });
            table.insert(Entity::new(self.spawned), components)?;
            self.spawned += 1;
        }

        let lifetime = u64::from(self.settings.entity_lifetime);
        if frame_index > lifetime {
            let expired_frame = (frame_index - lifetime - 1) as u32;
            for offset in 0..per_frame {
                table.remove(Entity::new(expired_frame * per_frame + offset));
            }
        }
        Ok(())
    }
}

impl<'p> Application<'p> for FrameDemo<'p> {
    fn initialize(&mut self, permanent: &'p Arena) -> Result<(), AppError> {
        self.app_name = Some(ArenaString::new(permanent, "frame_demo"));
        self.entities = Some(EntityLookupTable::new(
            permanent,
            self.settings.memory.lookup_buckets,
            self.settings.memory.lookup_nodes,
        )?);
        log::info!(
            "Initialized {} ({} bytes of permanent memory in use)",
            self.app_name.unwrap_or_default(),
            permanent.used()
        );
        Ok(())
    }

    fn update(&mut self, frame: &Frame<'_>) -> Result<bool, AppError> {
        let queue = Self::pick_graphics_queue(frame)
            .ok_or_else(|| AppError::Custom("no graphics queue".to_string()))?;
        let extensions = Self::extension_names(frame);
        let weight = Self::scratch_work(frame)?;
        self.churn_entities(frame.index())?;

        if self.settings.log_every > 0 && frame.index() % self.settings.log_every == 0 {
            let live = self.entities.as_ref().map_or(0, EntityLookupTable::len);
            log::info!(
                "Frame {}: queue {}, {} extensions, weight {:.2}, {} live entities, {} temporary bytes",
                frame.index(),
                queue,
                extensions.len(),
                weight,
                live,
                frame.temporary().used()
            );
        }
        Ok(true)
    }

    fn cleanup(&mut self) {
        let live = self.entities.as_ref().map_or(0, EntityLookupTable::len);
        log::info!("Spawned {} entities, {} still live", self.spawned, live);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_with_level(logging::LevelFilter::Info);

    let settings = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading configuration from {}", path);
            DemoConfig::load_from_file(&path)?
        }
        None => DemoConfig::default(),
    };
    settings.memory.validate()?;

    let frames = settings.frames;
    let mut engine = Engine::new(&settings.memory)?;
    let mut app = FrameDemo::new(settings);
    let completed = engine.run(&mut app, Some(frames))?;

    log::info!("Ran {} frames", completed);
    Ok(())
}
