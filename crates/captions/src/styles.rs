//! Caption style presets.
//!
//! Colours use the ASS `&HAABBGGRR` notation. Sizes and margins are in
//! script pixels for a 1080x1920 canvas; renderers scale them with
//! `PlayResX`/`PlayResY`.

use serde::Serialize;

use reelsmith_timeline_model::cue::CueStyle;

/// Every field of one ASS style entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CaptionStyle {
    pub name: &'static str,
    pub font: &'static str,
    pub size: u32,
    pub primary_colour: &'static str,
    pub secondary_colour: &'static str,
    pub outline_colour: &'static str,
    pub back_colour: &'static str,
    pub bold: bool,
    pub italic: bool,
    pub spacing: u32,
    /// 1 = outline + drop shadow, 3 = opaque box.
    pub border_style: u8,
    pub outline: u32,
    pub shadow: u32,
    /// Numpad alignment; 2 = bottom center.
    pub alignment: u8,
    pub margin_l: u32,
    pub margin_r: u32,
    pub margin_v: u32,
}

/// Body captions: heavy white text, thick outline, above the safe zone.
pub const DEFAULT_STYLE: CaptionStyle = CaptionStyle {
    name: "Default",
    font: "Arial Black",
    size: 85,
    primary_colour: "&H00FFFFFF",
    secondary_colour: "&H00FFFFFF",
    outline_colour: "&H00000000",
    back_colour: "&H80000000",
    bold: true,
    italic: false,
    spacing: 1,
    border_style: 1,
    outline: 4,
    shadow: 3,
    alignment: 2,
    margin_l: 40,
    margin_r: 40,
    margin_v: 180,
};

/// Hook caption: larger, yellow.
pub const HIGHLIGHT_STYLE: CaptionStyle = CaptionStyle {
    name: "Highlight",
    size: 95,
    primary_colour: "&H0000FFFF",
    outline: 5,
    shadow: 4,
    ..DEFAULT_STYLE
};

/// Accent caption: green.
pub const EMPHASIS_STYLE: CaptionStyle = CaptionStyle {
    name: "Emphasis",
    size: 90,
    primary_colour: "&H0080FF00",
    outline: 5,
    ..DEFAULT_STYLE
};

impl CaptionStyle {
    /// `Style:` line matching [`crate::ass::STYLE_FORMAT`].
    pub fn to_ass_line(&self) -> String {
        format!(
            "Style: {},{},{},{},{},{},{},{},{},0,0,100,100,{},0,{},{},{},{},{},{},{},1",
            self.name,
            self.font,
            self.size,
            self.primary_colour,
            self.secondary_colour,
            self.outline_colour,
            self.back_colour,
            ass_bool(self.bold),
            ass_bool(self.italic),
            self.spacing,
            self.border_style,
            self.outline,
            self.shadow,
            self.alignment,
            self.margin_l,
            self.margin_r,
            self.margin_v,
        )
    }
}

fn ass_bool(value: bool) -> i8 {
    if value {
        -1
    } else {
        0
    }
}

/// The style table of a cue script, one entry per [`CueStyle`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StyleSheet {
    pub default: CaptionStyle,
    pub highlight: CaptionStyle,
    pub emphasis: CaptionStyle,
}

impl Default for StyleSheet {
    fn default() -> Self {
        Self::standard()
    }
}

impl StyleSheet {
    /// The built-in presets.
    pub const fn standard() -> Self {
        Self {
            default: DEFAULT_STYLE,
            highlight: HIGHLIGHT_STYLE,
            emphasis: EMPHASIS_STYLE,
        }
    }

    pub fn get(&self, style: CueStyle) -> &CaptionStyle {
        match style {
            CueStyle::Default => &self.default,
            CueStyle::Highlight => &self.highlight,
            CueStyle::Emphasis => &self.emphasis,
        }
    }

    /// Entries in table order.
    pub fn iter(&self) -> impl Iterator<Item = &CaptionStyle> {
        CueStyle::ALL.into_iter().map(move |s| self.get(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_inherit_default_fields() {
        assert_eq!(HIGHLIGHT_STYLE.font, DEFAULT_STYLE.font);
        assert_eq!(HIGHLIGHT_STYLE.margin_v, 180);
        assert_eq!(EMPHASIS_STYLE.shadow, DEFAULT_STYLE.shadow);
        assert_ne!(HIGHLIGHT_STYLE.primary_colour, DEFAULT_STYLE.primary_colour);
    }

    #[test]
    fn test_style_line_field_count() {
        let line = DEFAULT_STYLE.to_ass_line();
        let fields: Vec<&str> = line.trim_start_matches("Style: ").split(',').collect();
        assert_eq!(fields.len(), 23);
        assert_eq!(fields[0], "Default");
        assert_eq!(fields[2], "85");
        assert_eq!(fields[7], "-1");
        assert_eq!(fields[18], "2");
        assert_eq!(fields[21], "180");
    }

    #[test]
    fn test_sheet_lookup_by_cue_style() {
        let sheet = StyleSheet::standard();
        assert_eq!(sheet.get(CueStyle::Highlight).name, "Highlight");
        let names: Vec<&str> = sheet.iter().map(|s| s.name).collect();
        assert_eq!(names, ["Default", "Highlight", "Emphasis"]);
    }
}
