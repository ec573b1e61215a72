//! Print parameters for `Page.printToPDF`.
//!
//! Defaults mirror Puppeteer: US letter, scale 1, no background, no header or
//! footer. Paper names are case-insensitive; unknown names keep the default size.
//! Margins accept `px`, `in`, `cm` and `mm` (unitless values are pixels) and
//! are converted to inches at 96 px per inch.

use serde_json::{json, Value};
use tracing::warn;

use crate::types::RenderOptions;

const PAPER_FORMATS: &[(&str, f64, f64)] = &[
    ("letter", 8.5, 11.0),
    ("legal", 8.5, 14.0),
    ("tabloid", 11.0, 17.0),
    ("ledger", 17.0, 11.0),
    ("a0", 33.1, 46.8),
    ("a1", 23.4, 33.1),
    ("a2", 16.54, 23.4),
    ("a3", 11.7, 16.54),
    ("a4", 8.27, 11.7),
    ("a5", 5.83, 8.27),
    ("a6", 4.13, 5.83),
];

const PX_PER_INCH: f64 = 96.0;

/// Width and height in inches of a named paper format.
pub fn paper_size(format: &str) -> Option<(f64, f64)> {
    let key = format.trim().to_ascii_lowercase();
    PAPER_FORMATS
        .iter()
        .find(|(name, _, _)| *name == key)
        .map(|(_, w, h)| (*w, *h))
}

fn px_per_unit(unit: &str) -> Option<f64> {
    match unit {
        "px" => Some(1.0),
        "in" => Some(96.0),
        "cm" => Some(37.8),
        "mm" => Some(3.78),
        _ => None,
    }
}

/// Converts a CSS length to inches. Unparseable values become `0.0`.
pub fn convert_margin(margin: &str) -> f64 {
    let margin = margin.trim();
    if margin.is_empty() {
        return 0.0;
    }

    let (value, factor) = match margin
        .len()
        .checked_sub(2)
        .filter(|&i| margin.is_char_boundary(i))
        .and_then(|i| {
            let unit = margin[i..].to_ascii_lowercase();
            px_per_unit(&unit).map(|f| (&margin[..i], f))
        }) {
        Some((value, factor)) => (value, factor),
        None => (margin, 1.0),
    };

    match value.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => v * factor / PX_PER_INCH,
        _ => {
            warn!(margin, "failed to parse margin value, using 0");
            0.0
        }
    }
}

/// Builds the full `Page.printToPDF` parameter object.
pub fn print_params(options: &RenderOptions) -> Value {
    let mut params = json!({
        "scale": 1.0,
        "displayHeaderFooter": false,
        "headerTemplate": "",
        "footerTemplate": "",
        "printBackground": false,
        "landscape": false,
        "pageRanges": "",
        "preferCSSPageSize": false,
        "omitBackground": false,
        "generateTaggedPDF": false,
        "generateDocumentOutline": false,
        "paperWidth": 8.5,
        "paperHeight": 11.0,
    });

    if !options.format.is_empty() {
        match paper_size(&options.format) {
            Some((w, h)) => {
                params["paperWidth"] = json!(w);
                params["paperHeight"] = json!(h);
            }
            None => warn!(format = %options.format, "unknown paper format, using letter"),
        }
    }

    if options.print_background {
        params["printBackground"] = json!(true);
    }

    if options.display_header_footer {
        params["displayHeaderFooter"] = json!(true);
        if !options.header_template.is_empty() {
            params["headerTemplate"] = json!(options.header_template);
        }
        if !options.footer_template.is_empty() {
            params["footerTemplate"] = json!(options.footer_template);
        }
    }

    let margin = &options.margin;
    for (key, value) in [
        ("marginTop", &margin.top),
        ("marginRight", &margin.right),
        ("marginBottom", &margin.bottom),
        ("marginLeft", &margin.left),
    ] {
        if !value.is_empty() {
            params[key] = json!(convert_margin(value));
        }
    }

    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Margin;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn margins_convert_to_inches() {
        assert!(close(convert_margin("96px"), 1.0));
        assert!(close(convert_margin("1in"), 1.0));
        assert!(close(convert_margin("2.54cm"), 2.54 * 37.8 / 96.0));
        assert!(close(convert_margin("10mm"), 37.8 / 96.0));
        assert!(close(convert_margin("48"), 0.5));
        assert!(close(convert_margin(" 1IN "), 1.0));
    }

    #[test]
    fn bad_margins_become_zero() {
        assert_eq!(convert_margin(""), 0.0);
        assert_eq!(convert_margin("wide"), 0.0);
        assert_eq!(convert_margin("px"), 0.0);
    }

    #[test]
    fn paper_formats_are_case_insensitive() {
        assert_eq!(paper_size("A4"), Some((8.27, 11.7)));
        assert_eq!(paper_size("Ledger"), Some((17.0, 11.0)));
        assert_eq!(paper_size("b5"), None);
    }

    #[test]
    fn defaults_are_letter_without_margins() {
        let p = print_params(&RenderOptions::default());
        assert_eq!(p["paperWidth"], json!(8.5));
        assert_eq!(p["paperHeight"], json!(11.0));
        assert_eq!(p["printBackground"], json!(false));
        assert!(p.get("marginTop").is_none());
    }

    #[test]
    fn templates_only_apply_with_header_footer() {
        let mut opts = RenderOptions {
            format: "a4".into(),
            header_template: "<span class=title></span>".into(),
            margin: Margin {
                top: "1in".into(),
                ..Margin::default()
            },
            ..RenderOptions::default()
        };
        let p = print_params(&opts);
        assert_eq!(p["headerTemplate"], json!(""));
        assert_eq!(p["marginTop"], json!(1.0));
        assert_eq!(p["paperWidth"], json!(8.27));

        opts.display_header_footer = true;
        let p = print_params(&opts);
        assert_eq!(p["headerTemplate"], json!("<span class=title></span>"));
        assert_eq!(p["displayHeaderFooter"], json!(true));
    }
}
