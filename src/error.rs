use std::num::ParseFloatError;
use wasm_bindgen::JsValue;

#[derive(Debug)]
pub enum TourError {
    XmlParse(quick_xml::Error),
    XmlWrite(std::io::Error),
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    InvalidAttribute {
        element: &'static str,
        attribute: &'static str,
        value: String,
    },
    FloatParse(ParseFloatError),
    InvalidTime {
        value: String,
        reason: chrono::ParseError,
    },
    /// Latitude outside [-90, 90], longitude outside [-180, 180], or a non-finite angle.
    InvalidCoordinate {
        kind: &'static str,
        value: f64,
    },
    /// A track segment without points.
    EmptySegment,
    InvalidOption {
        option: &'static str,
        value: f64,
    },
}

impl TourError {
    pub(crate) fn latitude(value: f64) -> Self {
        Self::InvalidCoordinate {
            kind: "latitude",
            value,
        }
    }

    pub(crate) fn longitude(value: f64) -> Self {
        Self::InvalidCoordinate {
            kind: "longitude",
            value,
        }
    }
}

impl std::fmt::Display for TourError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::XmlParse(e) => write!(f, "XML parse error: {e}"),
            Self::XmlWrite(e) => write!(f, "XML write error: {e}"),
            Self::MissingAttribute { element, attribute } => {
                write!(f, "Missing attribute '{attribute}' on <{element}>")
            }
            Self::InvalidAttribute {
                element,
                attribute,
                value,
            } => write!(
                f,
                "Invalid value '{value}' for attribute '{attribute}' on <{element}>"
            ),
            Self::FloatParse(e) => write!(f, "Float parse error: {e}"),
            Self::InvalidTime { value, reason } => {
                write!(f, "Invalid timestamp '{value}': {reason}")
            }
            Self::InvalidCoordinate { kind, value } => {
                write!(f, "Invalid {kind} {value}")
            }
            Self::EmptySegment => write!(f, "Cannot add a segment without points"),
            Self::InvalidOption { option, value } => {
                write!(f, "Invalid value {value} for option '{option}'")
            }
        }
    }
}

impl std::error::Error for TourError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::XmlParse(e) => Some(e),
            Self::XmlWrite(e) => Some(e),
            Self::FloatParse(e) => Some(e),
            Self::InvalidTime { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

impl From<quick_xml::Error> for TourError {
    fn from(e: quick_xml::Error) -> Self {
        Self::XmlParse(e)
    }
}

impl From<std::io::Error> for TourError {
    fn from(e: std::io::Error) -> Self {
        Self::XmlWrite(e)
    }
}

impl From<ParseFloatError> for TourError {
    fn from(e: ParseFloatError) -> Self {
        Self::FloatParse(e)
    }
}

impl From<TourError> for JsValue {
    fn from(e: TourError) -> Self {
        js_sys::Error::new(&e.to_string()).into()
    }
}
