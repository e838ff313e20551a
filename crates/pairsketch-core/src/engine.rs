//! Synchronization engine.
//!
//! Owns the scene and the render surface, applies local and remote actions,
//! and queues encoded messages for the channel. The engine never touches the
//! transport: the session manager drains [`SyncEngine::take_outgoing`] and
//! feeds channel events back in.

use crate::codec::{self, Action};
use crate::config::Config;
use crate::decode::{self, DecodeError, DecodeJob, DecodeOutcome, DecodeTicket, ImageDecoder, ThreadedDecoder};
use crate::render::{self, RenderSurface};
use crate::scene::{ImageHit, Origin, Scene, SceneError};
use crate::shapes::{DrawableObject, Image, Shape, ShapeStyle};
use kurbo::Point;
use std::collections::HashMap;

/// Channel lifecycle as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closed,
    Errored,
}

/// Which side asked for the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    /// We called connect.
    Initiator,
    /// The remote peer connected to us.
    Acceptor,
}

/// Where a freshly uploaded image lands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UploadPolicy {
    /// Longest allowed side; larger images are scaled down to it.
    pub max_size: f64,
    pub position: Point,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_size: 300.0,
            position: Point::new(50.0, 50.0),
        }
    }
}

impl From<&Config> for UploadPolicy {
    fn from(config: &Config) -> Self {
        Self {
            max_size: config.upload_max_size,
            position: config.upload_position(),
        }
    }
}

/// What to do with a bitmap once its decode finishes.
#[derive(Debug, Clone, Copy)]
enum Placement {
    /// Local upload: natural size, fitted, placed per policy, then sent.
    Upload,
    /// Received from the peer: placed exactly as described.
    Remote { position: Point, width: f64, height: f64 },
}

/// The shared-scene synchronization engine.
pub struct SyncEngine<S: RenderSurface> {
    scene: Scene,
    surface: S,
    decoder: Box<dyn ImageDecoder>,
    pending_images: HashMap<DecodeTicket, Placement>,
    next_ticket: DecodeTicket,
    state: ConnectionState,
    peer: Option<String>,
    /// Pending outgoing messages (JSON strings).
    outgoing: Vec<String>,
    selected_image: Option<usize>,
    last_error: Option<String>,
    upload: UploadPolicy,
}

impl<S: RenderSurface> SyncEngine<S> {
    /// Create an engine decoding images on background threads.
    pub fn new(surface: S) -> Self {
        Self::with_decoder(surface, Box::new(ThreadedDecoder::new()))
    }

    pub fn with_decoder(surface: S, decoder: Box<dyn ImageDecoder>) -> Self {
        Self {
            scene: Scene::new(),
            surface,
            decoder,
            pending_images: HashMap::new(),
            next_ticket: 0,
            state: ConnectionState::Disconnected,
            peer: None,
            outgoing: Vec::new(),
            selected_image: None,
            last_error: None,
            upload: UploadPolicy::default(),
        }
    }

    /// Apply client settings: upload placement and the initial grid overlay.
    pub fn configure(&mut self, config: &Config) {
        self.upload = UploadPolicy::from(config);
        self.scene.set_grid(config.grid_enabled);
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Peer of the current (or last) channel.
    pub fn peer(&self) -> Option<&str> {
        self.peer.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    // --- Channel lifecycle ---

    /// A channel to `peer` is being negotiated. Allowed from any state.
    pub fn begin_connect(&mut self, peer: &str) {
        log::info!("Connecting to {} (was {:?})", peer, self.state);
        self.state = ConnectionState::Connecting;
        self.peer = Some(peer.to_string());
        self.last_error = None;
        self.scene.end_remote_strokes();
        self.outgoing.clear();
    }

    /// The channel is usable. The accepting side brings the initiator up to
    /// date with a full-state transfer.
    pub fn channel_opened(&mut self, role: ChannelRole) {
        self.state = ConnectionState::Open;
        log::info!("Channel open with {:?} as {:?}", self.peer, role);
        if role == ChannelRole::Acceptor {
            self.full_state_transfer();
        }
    }

    pub fn channel_closed(&mut self) {
        log::info!("Channel with {:?} closed", self.peer);
        self.state = ConnectionState::Closed;
        self.finish_channel();
    }

    pub fn transport_error(&mut self, message: &str) {
        log::error!("Transport error: {}", message);
        self.state = ConnectionState::Errored;
        self.last_error = Some(message.to_string());
        self.finish_channel();
    }

    fn finish_channel(&mut self) {
        self.scene.end_remote_strokes();
        if !self.outgoing.is_empty() {
            log::debug!("Discarding {} unsent messages", self.outgoing.len());
            self.outgoing.clear();
        }
    }

    /// Send `ClearScene` followed by every committed object, in order.
    pub fn full_state_transfer(&mut self) {
        let replay: Vec<Action> = self
            .scene
            .snapshot()
            .filter_map(|object| match object {
                DrawableObject::Shape(shape) => Some(Action::ShapeCommit(*shape)),
                DrawableObject::Image(image) => Some(Action::image_add(image)),
                DrawableObject::Stroke(_) => None,
            })
            .collect();

        log::info!("Full-state transfer: {} objects", replay.len());
        self.emit(&Action::ClearScene);
        for action in &replay {
            self.emit(action);
        }
    }

    // --- Remote side ---

    /// Handle one message received on the channel. Malformed messages are
    /// dropped without touching the scene.
    pub fn handle_incoming(&mut self, data: &str) {
        match codec::decode(data) {
            Ok(action) => self.apply_remote(action),
            Err(e) => log::warn!("Dropping message from {:?}: {}", self.peer, e),
        }
    }

    /// Apply an action that came from the peer. Never re-emitted.
    pub fn apply_remote(&mut self, action: Action) {
        let origin = Origin::Remote(self.peer.clone().unwrap_or_default());
        match action {
            Action::StrokePoint { point, style, begin } => {
                if begin {
                    self.scene.begin_stroke(origin, point, style);
                    return;
                }
                match self.scene.extend_stroke(&origin, point) {
                    Ok(previous) => render::render_segment(&mut self.surface, previous, point, &style),
                    Err(SceneError::UnknownStroke(origin)) => {
                        self.scene.begin_stroke(origin, point, style);
                    }
                }
            }
            Action::ShapeCommit(shape) => {
                self.scene.append_shape(shape);
                self.render();
            }
            Action::ImageAdd {
                data_url,
                position,
                width,
                height,
            } => {
                self.submit_decode(
                    data_url,
                    Placement::Remote {
                        position,
                        width,
                        height,
                    },
                );
            }
            Action::ClearScene => {
                self.scene.clear();
                self.selected_image = None;
                self.render();
            }
        }
    }

    // --- Local side ---

    /// Start local freehand ink at `point`.
    pub fn begin_local_stroke(&mut self, point: Point, style: ShapeStyle) {
        self.scene.begin_stroke(Origin::Local, point, style);
        self.emit(&Action::StrokePoint {
            point,
            style,
            begin: true,
        });
    }

    /// Extend local freehand ink: render the segment and send the sample.
    pub fn extend_local_stroke(&mut self, point: Point, style: ShapeStyle) {
        match self.scene.extend_stroke(&Origin::Local, point) {
            Ok(previous) => render::render_segment(&mut self.surface, previous, point, &style),
            Err(_) => {
                self.begin_local_stroke(point, style);
                return;
            }
        }
        self.emit(&Action::StrokePoint {
            point,
            style,
            begin: false,
        });
    }

    pub fn end_local_stroke(&mut self) {
        self.scene.end_stroke(&Origin::Local);
    }

    /// Commit a finished shape locally and send it.
    pub fn commit_shape(&mut self, shape: Shape) {
        self.scene.append_shape(shape);
        self.render();
        self.emit(&Action::ShapeCommit(shape));
    }

    /// Start inserting an uploaded image from raw file bytes.
    ///
    /// The image appears (and is sent) once its decode completes, see
    /// [`SyncEngine::poll_decodes`].
    pub fn insert_image_bytes(&mut self, bytes: &[u8]) -> Result<DecodeTicket, DecodeError> {
        let data_url = decode::to_data_url(bytes)?;
        Ok(self.submit_decode(data_url, Placement::Upload))
    }

    /// Clear locally and tell the peer.
    pub fn clear_scene(&mut self) {
        self.scene.clear();
        self.selected_image = None;
        self.render();
        self.emit(&Action::ClearScene);
    }

    /// Toggle the local grid overlay.
    pub fn toggle_grid(&mut self) -> bool {
        let enabled = self.scene.toggle_grid();
        self.render();
        enabled
    }

    // --- Local image manipulation (not propagated) ---

    pub fn image_at(&self, point: Point) -> Option<ImageHit> {
        self.scene.select_image_at(point)
    }

    pub fn selected_image(&self) -> Option<usize> {
        self.selected_image
    }

    pub fn set_selected_image(&mut self, index: Option<usize>) {
        self.selected_image = index;
        self.render();
    }

    /// Move an image so its top-left corner is at `position`.
    pub fn move_image(&mut self, index: usize, position: Point) {
        if let Some(image) = self.scene.image_mut(index) {
            image.move_to(position);
            self.render();
        }
    }

    /// Resize an image; see [`Image::resize`] for the clamping rules.
    pub fn resize_image(&mut self, index: usize, width: f64, height: f64, preserve_ratio: bool) {
        if let Some(image) = self.scene.image_mut(index) {
            image.resize(width, height, preserve_ratio);
            self.render();
        }
    }

    // --- Image decoding ---

    fn submit_decode(&mut self, data_url: String, placement: Placement) -> DecodeTicket {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.pending_images.insert(ticket, placement);
        self.decoder.submit(DecodeJob { ticket, data_url });
        ticket
    }

    /// Number of image decodes still in flight.
    pub fn pending_decodes(&self) -> usize {
        self.pending_images.len()
    }

    /// Apply finished image decodes, in completion order. Returns how many
    /// images were added.
    pub fn poll_decodes(&mut self) -> usize {
        let mut added = 0;
        for outcome in self.decoder.poll_completed() {
            if self.apply_decoded(outcome) {
                added += 1;
            }
        }
        added
    }

    fn apply_decoded(&mut self, outcome: DecodeOutcome) -> bool {
        let Some(placement) = self.pending_images.remove(&outcome.ticket) else {
            log::warn!("Decode result for unknown ticket {}", outcome.ticket);
            return false;
        };

        let bitmap = match outcome.result {
            Ok(bitmap) => bitmap,
            Err(e) => {
                log::warn!("Dropping image {}: {}", outcome.ticket, e);
                return false;
            }
        };

        match placement {
            Placement::Upload => {
                let image = Image::natural(outcome.data_url, bitmap, self.upload.position).fit_within(self.upload.max_size);
                let action = Action::image_add(&image);
                self.scene.append_image(image);
                self.render();
                self.emit(&action);
            }
            Placement::Remote {
                position,
                width,
                height,
            } => {
                self.scene
                    .append_image(Image::new(outcome.data_url, bitmap, position, width, height));
                self.render();
            }
        }
        true
    }

    // --- Rendering ---

    /// Full re-render of the scene.
    pub fn render(&mut self) {
        render::render_scene(&mut self.surface, &self.scene, self.selected_image);
    }

    /// Full re-render with an uncommitted shape drawn on top.
    pub fn render_preview(&mut self, shape: &Shape) {
        self.render();
        render::render_shape(&mut self.surface, shape);
    }

    // --- Outgoing ---

    fn emit(&mut self, action: &Action) {
        if self.state != ConnectionState::Open {
            log::debug!("Channel not open ({:?}); not sending {}", self.state, wire_name(action));
            return;
        }
        match codec::encode(action) {
            Ok(text) => self.outgoing.push(text),
            Err(e) => log::error!("Failed to encode {}: {}", wire_name(action), e),
        }
    }

    /// Take all pending outgoing messages.
    pub fn take_outgoing(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outgoing)
    }

    /// Check if there are pending outgoing messages.
    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }
}

fn wire_name(action: &Action) -> &'static str {
    match action {
        Action::StrokePoint { .. } => "draw",
        Action::ShapeCommit(_) => "shape",
        Action::ImageAdd { .. } => "image",
        Action::ClearScene => "clear",
    }
}
