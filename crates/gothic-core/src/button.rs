use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(rename_all = "snake_case")]
pub enum ButtonType {
    Standard,
    Icon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(rename_all = "snake_case")]
pub enum ButtonTheme {
    Outline,
    FilledBlue,
    FilledBlack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(rename_all = "snake_case")]
pub enum ButtonSize {
    Large,
    Medium,
    Small,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(rename_all = "snake_case")]
pub enum ButtonShape {
    Rectangular,
    Pill,
    Circle,
    Square,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(rename_all = "snake_case")]
pub enum ButtonText {
    SigninWith,
    SignupWith,
    ContinueWith,
    Signin,
}

/// Rendering options for the provider's sign-in button.
///
/// Every field is optional; unset fields fall back to the defaults in
/// [`ButtonOptions::merged_over_defaults`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct ButtonOptions {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ButtonType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<ButtonTheme>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<ButtonSize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape: Option<ButtonShape>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<ButtonText>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

impl ButtonOptions {
    /// Standard outline pill, medium size.
    pub fn defaults() -> Self {
        Self {
            kind: Some(ButtonType::Standard),
            theme: Some(ButtonTheme::Outline),
            size: Some(ButtonSize::Medium),
            shape: Some(ButtonShape::Pill),
            ..Self::default()
        }
    }

    /// Caller-supplied fields win; everything else comes from `defaults()`.
    pub fn merged_over_defaults(self) -> Self {
        let base = Self::defaults();
        Self {
            kind: self.kind.or(base.kind),
            theme: self.theme.or(base.theme),
            size: self.size.or(base.size),
            shape: self.shape.or(base.shape),
            text: self.text.or(base.text),
            width: self.width.or(base.width),
            locale: self.locale.or(base.locale),
        }
    }
}
