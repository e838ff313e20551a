//! Action codec: edit intents to and from wire messages.
//!
//! ## Wire format
//!
//! Messages are JSON objects discriminated by `type`:
//! ```json
//! { "type": "draw", "x": 10, "y": 20, "color": "#000000", "size": 5 }
//! { "type": "shape", "shapeType": "rect", "x1": 0, "y1": 0, "x2": 50, "y2": 40, "color": "#ff0000", "size": 3 }
//! { "type": "image", "data": "data:image/png;base64,...", "x": 50, "y": 50, "width": 300, "height": 150 }
//! { "type": "clear" }
//! ```

use crate::shapes::{Image, SerializableColor, Shape, ShapeKind, ShapeStyle};
use kurbo::Point;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("failed to encode message: {0}")]
    Encode(String),
}

/// An edit intent, local or remote.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// One incremental freehand sample.
    StrokePoint {
        point: Point,
        style: ShapeStyle,
        /// First sample of a new stroke.
        begin: bool,
    },
    /// A finished geometric shape.
    ShapeCommit(Shape),
    /// An image, payload still encoded.
    ImageAdd {
        data_url: String,
        position: Point,
        width: f64,
        height: f64,
    },
    /// Scene reset.
    ClearScene,
}

impl Action {
    /// The `ImageAdd` that reproduces `image` as currently placed.
    pub fn image_add(image: &Image) -> Self {
        Action::ImageAdd {
            data_url: image.data_url.clone(),
            position: image.position,
            width: image.width,
            height: image.height,
        }
    }
}

/// A message as it travels over the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    Draw {
        x: f64,
        y: f64,
        color: SerializableColor,
        #[serde(deserialize_with = "number_or_string")]
        size: f64,
        #[serde(default, skip_serializing_if = "is_false")]
        begin: bool,
    },
    Shape {
        #[serde(rename = "shapeType")]
        shape_type: ShapeKind,
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        color: SerializableColor,
        #[serde(deserialize_with = "number_or_string")]
        size: f64,
    },
    Image {
        data: String,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    Clear,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Sizes come from a form input and may arrive as numeric strings.
fn number_or_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Number(f64),
        Text(String),
    }

    match Size::deserialize(deserializer)? {
        Size::Number(value) => Ok(value),
        Size::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

impl From<&Action> for WireMessage {
    fn from(action: &Action) -> Self {
        match action {
            Action::StrokePoint {
                point,
                style,
                begin,
            } => WireMessage::Draw {
                x: point.x,
                y: point.y,
                color: style.stroke_color,
                size: style.stroke_width,
                begin: *begin,
            },
            Action::ShapeCommit(shape) => WireMessage::Shape {
                shape_type: shape.kind,
                x1: shape.start.x,
                y1: shape.start.y,
                x2: shape.end.x,
                y2: shape.end.y,
                color: shape.style.stroke_color,
                size: shape.style.stroke_width,
            },
            Action::ImageAdd {
                data_url,
                position,
                width,
                height,
            } => WireMessage::Image {
                data: data_url.clone(),
                x: position.x,
                y: position.y,
                width: *width,
                height: *height,
            },
            Action::ClearScene => WireMessage::Clear,
        }
    }
}

impl From<WireMessage> for Action {
    fn from(message: WireMessage) -> Self {
        match message {
            WireMessage::Draw {
                x,
                y,
                color,
                size,
                begin,
            } => Action::StrokePoint {
                point: Point::new(x, y),
                style: ShapeStyle::new(color, size),
                begin,
            },
            WireMessage::Shape {
                shape_type,
                x1,
                y1,
                x2,
                y2,
                color,
                size,
            } => Action::ShapeCommit(Shape::new(
                shape_type,
                Point::new(x1, y1),
                Point::new(x2, y2),
                ShapeStyle::new(color, size),
            )),
            WireMessage::Image {
                data,
                x,
                y,
                width,
                height,
            } => Action::ImageAdd {
                data_url: data,
                position: Point::new(x, y),
                width,
                height,
            },
            WireMessage::Clear => Action::ClearScene,
        }
    }
}

/// Encode an action as wire JSON.
pub fn encode(action: &Action) -> Result<String, CodecError> {
    serde_json::to_string(&WireMessage::from(action)).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decode wire JSON into an action.
///
/// Unknown discriminants, missing fields and unparseable colors or sizes all
/// yield [`CodecError::MalformedMessage`]. Extra fields are ignored.
pub fn decode(text: &str) -> Result<Action, CodecError> {
    serde_json::from_str::<WireMessage>(text)
        .map(Action::from)
        .map_err(|e| CodecError::MalformedMessage(e.to_string()))
}
