//! Presentation controls
//! Core Principle: A presentation only supplies defaults; it never changes where a value is written

use serde::{Deserialize, Serialize};

fn default_decimal() -> u32 {
    1
}

fn default_long_decimal() -> u64 {
    1
}

/// One UI control of a presentation, bound to an element through `ref_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PresentationControl {
    #[serde(rename_all = "camelCase")]
    CheckBox {
        ref_id: String,
        #[serde(default)]
        label: String,
        #[serde(default)]
        default_checked: bool,
    },
    #[serde(rename_all = "camelCase")]
    ComboBox {
        ref_id: String,
        #[serde(default)]
        label: String,
        #[serde(default)]
        default: Option<String>,
        #[serde(default)]
        suggestions: Vec<String>,
        #[serde(default)]
        no_sort: bool,
    },
    #[serde(rename_all = "camelCase")]
    DecimalTextBox {
        ref_id: String,
        #[serde(default)]
        label: String,
        #[serde(default = "default_decimal")]
        default_value: u32,
        #[serde(default)]
        spin: bool,
        #[serde(default)]
        spin_step: Option<u32>,
    },
    #[serde(rename_all = "camelCase")]
    LongDecimalTextBox {
        ref_id: String,
        #[serde(default)]
        label: String,
        #[serde(default = "default_long_decimal")]
        default_value: u64,
        #[serde(default)]
        spin: bool,
        #[serde(default)]
        spin_step: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    DropdownList {
        ref_id: String,
        #[serde(default)]
        label: String,
        #[serde(default)]
        default_item: u32,
        #[serde(default)]
        no_sort: bool,
    },
    #[serde(rename_all = "camelCase")]
    ListBox {
        ref_id: String,
        #[serde(default)]
        label: String,
    },
    #[serde(rename_all = "camelCase")]
    MultiTextBox {
        ref_id: String,
        #[serde(default)]
        label: String,
        #[serde(default)]
        show_as_dialog: bool,
        #[serde(default)]
        default_height: Option<u32>,
    },
    #[serde(rename_all = "camelCase")]
    TextBox {
        ref_id: String,
        #[serde(default)]
        label: String,
        #[serde(default)]
        default_value: Option<String>,
    },
    Text {
        #[serde(default)]
        text: String,
    },
}

impl PresentationControl {
    /// Element id this control is bound to. Plain text is bound to nothing.
    pub fn ref_id(&self) -> Option<&str> {
        match self {
            PresentationControl::CheckBox { ref_id, .. }
            | PresentationControl::ComboBox { ref_id, .. }
            | PresentationControl::DecimalTextBox { ref_id, .. }
            | PresentationControl::LongDecimalTextBox { ref_id, .. }
            | PresentationControl::DropdownList { ref_id, .. }
            | PresentationControl::ListBox { ref_id, .. }
            | PresentationControl::MultiTextBox { ref_id, .. }
            | PresentationControl::TextBox { ref_id, .. } => Some(ref_id),
            PresentationControl::Text { .. } => None,
        }
    }
}

/// Named group of controls for one policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyPresentation {
    pub id: String,
    #[serde(default)]
    pub controls: Vec<PresentationControl>,
}

impl PolicyPresentation {
    pub fn control(&self, ref_id: &str) -> Option<&PresentationControl> {
        self.controls.iter().find(|c| c.ref_id() == Some(ref_id))
    }

    pub fn check_box_default(&self, ref_id: &str) -> Option<bool> {
        self.controls.iter().find_map(|c| match c {
            PresentationControl::CheckBox {
                ref_id: id,
                default_checked,
                ..
            } if id == ref_id => Some(*default_checked),
            _ => None,
        })
    }

    pub fn decimal_default(&self, ref_id: &str) -> Option<u32> {
        self.controls.iter().find_map(|c| match c {
            PresentationControl::DecimalTextBox {
                ref_id: id,
                default_value,
                ..
            } if id == ref_id => Some(*default_value),
            _ => None,
        })
    }

    pub fn long_decimal_default(&self, ref_id: &str) -> Option<u64> {
        self.controls.iter().find_map(|c| match c {
            PresentationControl::LongDecimalTextBox {
                ref_id: id,
                default_value,
                ..
            } if id == ref_id => Some(*default_value),
            _ => None,
        })
    }

    /// Selected item index of the dropdown bound to `ref_id`.
    pub fn dropdown_default(&self, ref_id: &str) -> Option<usize> {
        self.controls.iter().find_map(|c| match c {
            PresentationControl::DropdownList {
                ref_id: id,
                default_item,
                ..
            } if id == ref_id => Some(*default_item as usize),
            _ => None,
        })
    }

    /// Text box default first, then combo box default.
    pub fn text_default(&self, ref_id: &str) -> Option<&str> {
        let text_box = self.controls.iter().find_map(|c| match c {
            PresentationControl::TextBox {
                ref_id: id,
                default_value: Some(value),
                ..
            } if id == ref_id => Some(value.as_str()),
            _ => None,
        });
        text_box.or_else(|| {
            self.controls.iter().find_map(|c| match c {
                PresentationControl::ComboBox {
                    ref_id: id,
                    default: Some(value),
                    ..
                } if id == ref_id => Some(value.as_str()),
                _ => None,
            })
        })
    }
}
