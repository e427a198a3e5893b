// Render options embedded in shader comments
//
// A directive line looks like:
//
//     // SHADEY anything here: resolution = 1024 256
//
// Malformed lines are skipped silently. Only an out-of-range resolution is
// an error, and it is raised before any GPU work starts.

use crate::error::{RenderError, Result};

const MARKERS: [&str; 2] = ["// SHADEY", "//SHADEY"];

pub const MAX_EXTENT: u32 = 16384;
pub const MAX_AREA: u64 = 4096 * 2048;

/// Which positions the built-in vertex shader synthesizes.
///
/// Both are drawn as a three-vertex triangle list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Topology {
    /// One oversized triangle covering the whole viewport.
    #[default]
    Quad,
    /// A single triangle in the middle of the viewport.
    Triangle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::validation(
                "Can't have a resolution with an extent that is 0",
            ));
        }

        if self.width > MAX_EXTENT || self.height > MAX_EXTENT {
            return Err(RenderError::validation(format!(
                "Can't have a resolution with an extent greater than {MAX_EXTENT}"
            )));
        }

        if self.pixel_count() > MAX_AREA {
            return Err(RenderError::validation(
                "Can't have a resolution with an area greater than 4096 * 2048",
            ));
        }

        Ok(())
    }

    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Size in bytes of a tightly packed RGBA8 image at this resolution.
    pub fn rgba8_size(&self) -> u64 {
        4 * self.pixel_count()
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::new(512, 512)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    pub clear_color: [f32; 4],
    pub topology: Topology,
    pub resolution: Resolution,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            topology: Topology::Quad,
            resolution: Resolution::default(),
        }
    }
}

impl RenderOptions {
    pub fn validate(&self) -> Result<()> {
        self.resolution.validate()
    }
}

/// Scan `source` for directive lines and build the render options.
pub fn parse_options(source: &str) -> Result<RenderOptions> {
    let mut options = RenderOptions::default();

    for line in source.lines() {
        let Some((param, value)) = split_directive(line) else {
            continue;
        };

        match param {
            "clearColor" => scan_into(value, &mut options.clear_color),
            "type" => {
                options.topology = if value.starts_with("tri") {
                    Topology::Triangle
                } else {
                    Topology::Quad
                };
            }
            "resolution" => {
                let mut extent = [options.resolution.width, options.resolution.height];
                scan_into(value, &mut extent);
                options.resolution = Resolution::new(extent[0], extent[1]);
                options.resolution.validate()?;
            }
            other => log::debug!("Ignoring unknown directive parameter {:?}", other),
        }
    }

    Ok(options)
}

/// Returns `(param, value)` for a well-formed directive line.
fn split_directive(line: &str) -> Option<(&str, &str)> {
    let line = line.trim_start();
    if !MARKERS.iter().any(|marker| line.starts_with(marker)) {
        return None;
    }

    let colon = line.find(':')?;
    let equals = line.find('=')?;

    // Lines with an '=' before the first ':' are dropped, even when a later
    // ':' would have made them well formed.
    if equals < colon || equals + 1 == line.len() {
        return None;
    }

    let param = line[colon + 1..equals].trim();
    let value = line[equals + 1..].trim();
    Some((param, value))
}

/// Fill `slots` from whitespace-separated tokens, the way `sscanf` does.
///
/// A token assigns its longest numeric prefix. Scanning stops at the first
/// token with no numeric prefix, or right after one with trailing junk.
/// Slots past that point keep their old values.
fn scan_into<T: std::str::FromStr>(value: &str, slots: &mut [T]) {
    for (slot, token) in slots.iter_mut().zip(value.split_whitespace()) {
        let Some((parsed, consumed)) = parse_prefix(token) else {
            break;
        };
        *slot = parsed;
        if consumed < token.len() {
            break;
        }
    }
}

/// Longest prefix of a numeric literal the numeric scanner would accept.
const MAX_NUMBER_CHARS: usize = 64;

/// Parse the longest prefix of `token` that is a valid `T`, returning the
/// value and the number of bytes it used.
fn parse_prefix<T: std::str::FromStr>(token: &str) -> Option<(T, usize)> {
    let numeric = token
        .char_indices()
        .take_while(|&(i, c)| i < MAX_NUMBER_CHARS && (c.is_ascii_digit() || "+-.eE".contains(c)))
        .map(|(i, c)| i + c.len_utf8())
        .last()?;

    (1..=numeric)
        .rev()
        .find_map(|end| token[..end].parse().ok().map(|parsed| (parsed, end)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_no_directives_gives_defaults() {
        let source = "void main() {\n  gl_FragColor = vec4(1.0);\n}\n";
        assert_eq!(parse_options(source).unwrap(), RenderOptions::default());

        let defaults = RenderOptions::default();
        assert_eq!(defaults.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(defaults.topology, Topology::Quad);
        assert_eq!(defaults.resolution, Resolution::new(512, 512));
    }

    #[test]
    fn test_clear_color() {
        let options = parse_options("// SHADEY foo: clearColor = 1 0 0 1").unwrap();
        assert_eq!(options.clear_color, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_clear_color_partial_assignment() {
        let options = parse_options("// SHADEY: clearColor = 0.5 0.25 oops 0.1").unwrap();
        assert_eq!(options.clear_color, [0.5, 0.25, 0.0, 1.0]);
    }

    #[test]
    fn test_numeric_prefix_is_kept() {
        let options = parse_options("// SHADEY: resolution = 256x128").unwrap();
        assert_eq!(options.resolution, Resolution::new(256, 512));

        let options = parse_options("// SHADEY: clearColor = 1f 0 0 1").unwrap();
        assert_eq!(options.clear_color, [1.0, 0.0, 0.0, 1.0]);

        let options = parse_options("// SHADEY: clearColor = 0.5 0.25e 0.75 0").unwrap();
        assert_eq!(options.clear_color, [0.5, 0.25, 0.0, 1.0]);
    }

    #[rstest]
    #[case("64", Some((64, 2)))]
    #[case("64px", Some((64, 2)))]
    #[case("x64", None)]
    #[case("", None)]
    fn test_parse_prefix(#[case] token: &str, #[case] expected: Option<(u32, usize)>) {
        assert_eq!(parse_prefix::<u32>(token), expected);
    }

    #[rstest]
    #[case("//SHADEY x: type=triangle", Topology::Triangle)]
    #[case("//SHADEY x: type=tri", Topology::Triangle)]
    #[case("//SHADEY x: type=something-else", Topology::Quad)]
    #[case("//SHADEY x: type=Triangle", Topology::Quad)]
    fn test_topology(#[case] line: &str, #[case] expected: Topology) {
        assert_eq!(parse_options(line).unwrap().topology, expected);
    }

    #[test]
    fn test_last_directive_wins() {
        let source = "\
// SHADEY: type = tri
// SHADEY: resolution = 64 32
// SHADEY: type = quad
// SHADEY: resolution = 128 16
";
        let options = parse_options(source).unwrap();
        assert_eq!(options.topology, Topology::Quad);
        assert_eq!(options.resolution, Resolution::new(128, 16));
    }

    #[test]
    fn test_leading_whitespace_before_marker() {
        let options = parse_options("    \t// SHADEY: resolution = 100 200").unwrap();
        assert_eq!(options.resolution, Resolution::new(100, 200));
    }

    #[rstest]
    #[case::no_marker("// SHADE: resolution = 8 8")]
    #[case::marker_not_at_start("x = 1; // SHADEY: resolution = 8 8")]
    #[case::no_colon("// SHADEY resolution = 8 8")]
    #[case::no_equals("// SHADEY: resolution 8 8")]
    #[case::equals_before_colon("// SHADEY a=b: resolution = 8 8")]
    #[case::trailing_equals("// SHADEY: resolution =")]
    #[case::unknown_param("// SHADEY: size = 8 8")]
    fn test_malformed_lines_are_ignored(#[case] line: &str) {
        assert_eq!(parse_options(line).unwrap(), RenderOptions::default());
    }

    #[test]
    fn test_unparseable_resolution_keeps_previous_value() {
        let options = parse_options("// SHADEY: resolution = wide tall").unwrap();
        assert_eq!(options.resolution, Resolution::default());

        let options = parse_options("// SHADEY: resolution = 64 tall").unwrap();
        assert_eq!(options.resolution, Resolution::new(64, 512));
    }

    #[rstest]
    #[case(0, 512)]
    #[case(512, 0)]
    #[case(16385, 1)]
    #[case(1, 16385)]
    #[case(4096, 2049)]
    #[case(16384, 16384)]
    #[case(8192, 1025)]
    fn test_resolution_out_of_bounds(#[case] width: u32, #[case] height: u32) {
        let line = format!("// SHADEY: resolution = {width} {height}");
        let err = parse_options(&line).unwrap_err();
        assert!(matches!(err, RenderError::Validation(_)), "{err:?}");
    }

    #[rstest]
    #[case(1, 1)]
    #[case(4096, 2048)]
    #[case(16384, 512)]
    #[case(512, 16384)]
    fn test_resolution_in_bounds(#[case] width: u32, #[case] height: u32) {
        let line = format!("// SHADEY: resolution = {width} {height}");
        assert_eq!(
            parse_options(&line).unwrap().resolution,
            Resolution::new(width, height)
        );
    }

    #[test]
    fn test_validation_messages() {
        let err = parse_options("// SHADEY: resolution = 0 4").unwrap_err();
        assert_eq!(err.to_string(), "Can't have a resolution with an extent that is 0");

        let err = parse_options("// SHADEY: resolution = 20000 4").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Can't have a resolution with an extent greater than 16384"
        );

        let err = parse_options("// SHADEY: resolution = 8192 8192").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Can't have a resolution with an area greater than 4096 * 2048"
        );
    }

    #[test]
    fn test_readback_size() {
        assert_eq!(Resolution::new(512, 512).rgba8_size(), 4 * 512 * 512);
    }
}
