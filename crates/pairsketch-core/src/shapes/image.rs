//! Image object for embedding raster images.

use super::Drawable;
use kurbo::{BezPath, Point, Rect, Shape as KurboShape};
use std::fmt;
use std::sync::Arc;

/// Lower bound for an image's width and height under any resize.
pub const MIN_IMAGE_SIZE: f64 = 20.0;

/// Distance from the bottom-right corner that still counts as the resize handle.
pub const RESIZE_HANDLE_TOLERANCE: f64 = 15.0;

/// Image format of an encoded payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    WebP,
    Gif,
}

impl ImageFormat {
    /// Get MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::WebP => "image/webp",
            ImageFormat::Gif => "image/gif",
        }
    }

    /// Detect format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 4 {
            return None;
        }

        // PNG: 89 50 4E 47
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
            return Some(ImageFormat::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(ImageFormat::Jpeg);
        }

        // GIF: GIF8
        if data.starts_with(b"GIF8") {
            return Some(ImageFormat::Gif);
        }

        // WebP: RIFF....WEBP
        if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            return Some(ImageFormat::WebP);
        }

        None
    }
}

/// A decoded RGBA8 raster.
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA8 pixels, shared between copies of the same image.
    pub pixels: Arc<Vec<u8>>,
}

impl Bitmap {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels: Arc::new(pixels),
        }
    }

    /// Natural width / height ratio; 1.0 for degenerate bitmaps.
    pub fn aspect_ratio(&self) -> f64 {
        if self.width == 0 || self.height == 0 {
            1.0
        } else {
            self.width as f64 / self.height as f64
        }
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// A raster image placed on the surface.
#[derive(Clone, PartialEq)]
pub struct Image {
    /// Self-contained encoded payload (data URL), sent verbatim to peers.
    pub data_url: String,
    /// Decoded raster.
    pub bitmap: Bitmap,
    /// Top-left corner position.
    pub position: Point,
    /// Display width.
    pub width: f64,
    /// Display height.
    pub height: f64,
    /// Width / height ratio of the bitmap, fixed at insertion.
    pub aspect_ratio: f64,
}

impl Image {
    /// Create an image with explicit display size.
    pub fn new(data_url: String, bitmap: Bitmap, position: Point, width: f64, height: f64) -> Self {
        let aspect_ratio = bitmap.aspect_ratio();
        Self {
            data_url,
            bitmap,
            position,
            width,
            height,
            aspect_ratio,
        }
    }

    /// Create an image displayed at its natural size.
    pub fn natural(data_url: String, bitmap: Bitmap, position: Point) -> Self {
        let (width, height) = (bitmap.width as f64, bitmap.height as f64);
        Self::new(data_url, bitmap, position, width, height)
    }

    /// Shrink so neither side exceeds `max_size`, preserving the aspect ratio.
    ///
    /// Images already within bounds are left untouched.
    pub fn fit_within(mut self, max_size: f64) -> Self {
        if self.width <= max_size && self.height <= max_size {
            return self;
        }
        if self.width > self.height {
            self.width = max_size;
            self.height = max_size / self.aspect_ratio;
        } else {
            self.height = max_size;
            self.width = max_size * self.aspect_ratio;
        }
        self
    }

    /// Get the bounding rectangle.
    pub fn as_rect(&self) -> Rect {
        Rect::new(
            self.position.x,
            self.position.y,
            self.position.x + self.width,
            self.position.y + self.height,
        )
    }

    /// Bottom-right corner, where the resize handle sits.
    pub fn handle_position(&self) -> Point {
        Point::new(self.position.x + self.width, self.position.y + self.height)
    }

    /// Whether `point` lies within the resize handle zone.
    pub fn hits_handle(&self, point: Point) -> bool {
        let corner = self.handle_position();
        (point.x - corner.x).abs() < RESIZE_HANDLE_TOLERANCE
            && (point.y - corner.y).abs() < RESIZE_HANDLE_TOLERANCE
    }

    /// Whether `point` lies within the image body (edges inclusive).
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.position.x
            && point.x <= self.position.x + self.width
            && point.y >= self.position.y
            && point.y <= self.position.y + self.height
    }

    /// Move the top-left corner.
    pub fn move_to(&mut self, position: Point) {
        self.position = position;
    }

    /// Resize, clamping both sides to [`MIN_IMAGE_SIZE`].
    ///
    /// With `preserve_ratio` only `width` is honored and the height follows
    /// from the aspect ratio; if that would undercut the minimum, the height
    /// is pinned to the minimum and the width derived from it instead.
    pub fn resize(&mut self, width: f64, height: f64, preserve_ratio: bool) {
        let width = width.max(MIN_IMAGE_SIZE);
        if !preserve_ratio {
            self.width = width;
            self.height = height.max(MIN_IMAGE_SIZE);
            return;
        }

        let derived = width / self.aspect_ratio;
        if derived >= MIN_IMAGE_SIZE {
            self.width = width;
            self.height = derived;
        } else {
            self.height = MIN_IMAGE_SIZE;
            self.width = MIN_IMAGE_SIZE * self.aspect_ratio;
        }
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("data_url_len", &self.data_url.len())
            .field("bitmap", &self.bitmap)
            .field("position", &self.position)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("aspect_ratio", &self.aspect_ratio)
            .finish()
    }
}

impl Drawable for Image {
    fn bounds(&self) -> Rect {
        self.as_rect()
    }

    fn to_path(&self) -> BezPath {
        // Bounding box as path (outline only, pixels are drawn separately)
        self.as_rect().to_path(0.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(natural_width: u32, natural_height: u32) -> Image {
        let bitmap = Bitmap::new(
            natural_width,
            natural_height,
            vec![0; (natural_width * natural_height * 4) as usize],
        );
        Image::natural("data:image/png;base64,".to_string(), bitmap, Point::ZERO)
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(ImageFormat::from_magic_bytes(&[0x89, 0x50, 0x4E, 0x47, 0x0D]), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::from_magic_bytes(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_magic_bytes(b"GIF89a"), Some(ImageFormat::Gif));
        assert_eq!(ImageFormat::from_magic_bytes(b"RIFF\0\0\0\0WEBPVP8 "), Some(ImageFormat::WebP));
        assert_eq!(ImageFormat::from_magic_bytes(b"hello"), None);
    }

    #[test]
    fn test_resize_clamps_to_minimum() {
        let mut img = image(100, 100);
        img.resize(5.0, 3.0, false);
        assert_eq!(img.width, MIN_IMAGE_SIZE);
        assert_eq!(img.height, MIN_IMAGE_SIZE);
    }

    #[test]
    fn test_resize_preserving_ratio_derives_height() {
        let mut img = image(200, 100);
        assert!((img.aspect_ratio - 2.0).abs() < f64::EPSILON);
        img.resize(80.0, 500.0, true);
        assert!((img.width - 80.0).abs() < f64::EPSILON);
        assert!((img.height - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_resize_preserving_ratio_never_undercuts_minimum() {
        let mut img = image(400, 100);
        img.resize(30.0, 0.0, true);
        assert!((img.height - MIN_IMAGE_SIZE).abs() < f64::EPSILON);
        assert!((img.width - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_fit_within() {
        // 1000x500 (2:1 aspect) into 300
        let fitted = image(1000, 500).fit_within(300.0);
        assert!((fitted.width - 300.0).abs() < 0.01);
        assert!((fitted.height - 150.0).abs() < 0.01);

        let tall = image(100, 600).fit_within(300.0);
        assert!((tall.height - 300.0).abs() < 0.01);
        assert!((tall.width - 50.0).abs() < 0.01);

        let small = image(120, 80).fit_within(300.0);
        assert_eq!((small.width, small.height), (120.0, 80.0));
    }

    #[test]
    fn test_handle_and_body_zones() {
        let mut img = image(100, 50);
        img.move_to(Point::new(10.0, 20.0));
        assert!(img.hits_handle(Point::new(120.0, 80.0)));
        assert!(img.hits_handle(Point::new(105.0, 65.0)));
        assert!(!img.hits_handle(Point::new(60.0, 40.0)));
        assert!(img.contains(Point::new(60.0, 40.0)));
        assert!(!img.contains(Point::new(5.0, 40.0)));
        assert_eq!(img.bounds(), Rect::new(10.0, 20.0, 110.0, 70.0));
    }
}
