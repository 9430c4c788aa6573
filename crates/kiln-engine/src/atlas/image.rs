use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use super::AtlasError;

static NEXT_IMAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an [`ImageData`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(u64);

/// Decoded RGBA8 pixels (straight alpha), shared by atlases and compositors.
///
/// Pixels can be replaced in place, canvas style; every replacement bumps
/// [`ImageData::generation`] so uploaded copies know they are stale.
#[derive(Debug)]
pub struct ImageData {
    id: ImageId,
    name: String,
    width: u32,
    height: u32,
    pixels: RwLock<Vec<u8>>,
    generation: AtomicU64,
}

pub type Image = Arc<ImageData>;

impl ImageData {
    pub fn new(
        name: impl Into<String>,
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    ) -> Result<Image, AtlasError> {
        let name = name.into();
        check_len(&name, width, height, &pixels)?;
        Ok(Arc::new(Self {
            id: ImageId(NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed)),
            name,
            width,
            height,
            pixels: RwLock::new(pixels),
            generation: AtomicU64::new(0),
        }))
    }

    /// An image where every texel is `rgba`.
    pub fn filled(name: impl Into<String>, width: u32, height: u32, rgba: [u8; 4]) -> Image {
        let pixels = rgba.repeat(width as usize * height as usize);
        Arc::new(Self {
            id: ImageId(NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.into(),
            width,
            height,
            pixels: RwLock::new(pixels),
            generation: AtomicU64::new(0),
        })
    }

    pub fn id(&self) -> ImageId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn with_pixels<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let pixels = match self.pixels.read() {
            Ok(p) => p,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&pixels)
    }

    /// Swaps in new pixels of the same dimensions.
    pub fn replace_pixels(&self, pixels: Vec<u8>) -> Result<(), AtlasError> {
        check_len(&self.name, self.width, self.height, &pixels)?;
        let mut slot = match self.pixels.write() {
            Ok(p) => p,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = pixels;
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

fn check_len(name: &str, width: u32, height: u32, pixels: &[u8]) -> Result<(), AtlasError> {
    let expected = width as usize * height as usize * 4;
    if pixels.len() != expected {
        return Err(AtlasError::InvalidImageData {
            name: name.to_string(),
            expected,
            actual: pixels.len(),
        });
    }
    Ok(())
}

/// Name-based image lookup used while loading atlas descriptors.
pub trait ImageSource {
    fn image(&self, name: &str) -> Option<Image>;
}

/// Loaded images keyed by their name.
#[derive(Debug, Clone, Default)]
pub struct ImageLibrary {
    images: HashMap<String, Image>,
}

impl ImageLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an image under its own name, replacing any previous one.
    pub fn insert(&mut self, image: Image) -> Option<Image> {
        self.images.insert(image.name().to_string(), image)
    }

    pub fn get(&self, name: &str) -> Option<&Image> {
        self.images.get(name)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

impl ImageSource for ImageLibrary {
    fn image(&self, name: &str) -> Option<Image> {
        self.images.get(name).cloned()
    }
}

impl ImageSource for HashMap<String, Image> {
    fn image(&self, name: &str) -> Option<Image> {
        self.get(name).cloned()
    }
}
