//! Out-of-band resource registry.
//!
//! The engine does no IO inside a frame: image pixels and font bytes are
//! registered up front under string keys, and objects reference them by
//! key. Text layout is shaped here with parley and memoized per
//! (content, font, size, width, color).

use std::{
    collections::HashMap,
    path::Path,
    sync::Arc,
};

use anyhow::Context as _;

use crate::{
    error::{EaselError, EaselResult},
    scene::{Rgba8, TextSpec},
};

/// Decoded raster image in premultiplied RGBA8 form.
#[derive(Clone, Debug)]
pub struct PreparedImage {
    pub width: u32,
    pub height: u32,
    pub rgba8_premul: Arc<Vec<u8>>,
}

pub fn decode_image(bytes: &[u8]) -> EaselResult<PreparedImage> {
    let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgba8_premul = rgba.into_raw();
    premultiply_rgba8_in_place(&mut rgba8_premul);

    Ok(PreparedImage {
        width,
        height,
        rgba8_premul: Arc::new(rgba8_premul),
    })
}

fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct LayoutKey {
    font: String,
    content: String,
    size_bits: u32,
    max_width_bits: Option<u32>,
    brush: Rgba8,
}

pub struct ResourceStore {
    images: HashMap<String, PreparedImage>,
    fonts: HashMap<String, Arc<Vec<u8>>>,
    text: TextLayoutEngine,
    layouts: HashMap<LayoutKey, Arc<parley::Layout<Rgba8>>>,
}

impl Default for ResourceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceStore {
    pub fn new() -> Self {
        Self {
            images: HashMap::new(),
            fonts: HashMap::new(),
            text: TextLayoutEngine::new(),
            layouts: HashMap::new(),
        }
    }

    pub fn insert_image(&mut self, key: impl Into<String>, image: PreparedImage) {
        self.images.insert(key.into(), image);
    }

    pub fn load_image_file(
        &mut self,
        key: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> EaselResult<()> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("read image '{}'", path.display()))?;
        self.insert_image(key, decode_image(&bytes)?);
        Ok(())
    }

    pub fn image(&self, key: &str) -> Option<&PreparedImage> {
        self.images.get(key)
    }

    /// Registering new bytes under an existing key drops layouts shaped
    /// against the old font.
    pub fn insert_font(&mut self, key: impl Into<String>, bytes: Vec<u8>) {
        let key = key.into();
        self.layouts.retain(|k, _| k.font != key);
        self.fonts.insert(key, Arc::new(bytes));
    }

    pub fn load_font_file(
        &mut self,
        key: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> EaselResult<()> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("read font '{}'", path.display()))?;
        self.insert_font(key, bytes);
        Ok(())
    }

    pub fn font_bytes(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        self.fonts.get(key).cloned()
    }

    /// Shape `spec` with the registered font, memoized. `Err(Resource)`
    /// when the font key is unknown.
    pub fn layout_text(
        &mut self,
        spec: &TextSpec,
        brush: Rgba8,
    ) -> EaselResult<Arc<parley::Layout<Rgba8>>> {
        let key = LayoutKey {
            font: spec.font.clone(),
            content: spec.content.clone(),
            size_bits: spec.size_px.to_bits(),
            max_width_bits: spec.max_width_px.map(f32::to_bits),
            brush,
        };
        if let Some(layout) = self.layouts.get(&key) {
            return Ok(layout.clone());
        }

        let font_bytes = self.fonts.get(&spec.font).ok_or_else(|| {
            EaselError::resource(format!("font '{}' is not registered", spec.font))
        })?;
        let layout = self.text.layout_plain(
            &spec.content,
            font_bytes,
            spec.size_px,
            brush,
            spec.max_width_px,
        )?;
        let layout = Arc::new(layout);
        self.layouts.insert(key, layout.clone());
        Ok(layout)
    }
}

struct TextLayoutEngine {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<Rgba8>,
}

impl TextLayoutEngine {
    fn new() -> Self {
        Self {
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
        }
    }

    fn layout_plain(
        &mut self,
        text: &str,
        font_bytes: &[u8],
        size_px: f32,
        brush: Rgba8,
        max_width_px: Option<f32>,
    ) -> EaselResult<parley::Layout<Rgba8>> {
        if !size_px.is_finite() || size_px <= 0.0 {
            return Err(EaselError::validation("text size_px must be finite and > 0"));
        }

        let families = self
            .font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(font_bytes.to_vec()), None);
        let family_id = families.first().map(|(id, _)| *id).ok_or_else(|| {
            EaselError::resource("no font families registered from font bytes")
        })?;

        let family_name = self
            .font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| EaselError::resource("registered font family has no name"))?
            .to_string();

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(family_name)),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size_px));
        builder.push_default(parley::style::StyleProperty::Brush(brush));

        let mut layout: parley::Layout<Rgba8> = builder.build(text);
        if let Some(w) = max_width_px {
            layout.break_all_lines(Some(w));
            layout.align(
                Some(w),
                parley::Alignment::Start,
                parley::AlignmentOptions::default(),
            );
        } else {
            layout.break_all_lines(None);
        }

        Ok(layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn decode_image_premultiplies() {
        let src_rgba = vec![100u8, 50u8, 200u8, 128u8];
        let img = image::RgbaImage::from_raw(1, 1, src_rgba).unwrap();
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();

        let prepared = decode_image(&buf).unwrap();
        assert_eq!((prepared.width, prepared.height), (1, 1));
        let px = &prepared.rgba8_premul[..4];
        assert_eq!(px[3], 128);
        assert!(px[0] < 100 && px[1] < 50 && px[2] < 200);
    }

    #[test]
    fn missing_font_is_a_resource_error() {
        let mut store = ResourceStore::new();
        let spec = TextSpec {
            content: "hi".to_string(),
            font: "nope".to_string(),
            size_px: 16.0,
            max_width_px: None,
        };
        let err = store.layout_text(&spec, Rgba8::default()).err().unwrap();
        assert!(matches!(err, EaselError::Resource(_)));
    }

    #[test]
    fn missing_image_key_is_none() {
        let store = ResourceStore::new();
        assert!(store.image("nope").is_none());
    }
}
