// src/resize/builder.rs
//
// Composes one resize-tool invocation out of many (source, target, size)
// entries.
//
// Layout of the rendered argument vector:
//
//   convert ( src1 -colorspace sRGB -resize WxH <opts> -write t1 -resize ... )
//           ( src2 -colorspace sRGB ... )
//           null:
//
// Each source is decoded once; its variations are applied largest first so
// every step downscales an already smaller buffer.

use super::common::Variation;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default number of target entries per invocation.
pub const DEFAULT_BATCH_LIMIT: usize = 10;

/// Output options shared by every resize step of an invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResizeOptions {
    pub sampling_factor: Option<String>,
    pub quality: Option<u8>,
    pub interlace: Option<String>,
    pub filter: Option<String>,
    pub strip: bool,
}

impl ResizeOptions {
    /// Render to tool flags. Order is fixed: sampling factor, quality,
    /// interlace, filter, strip.
    pub fn render(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(sampling) = non_empty(&self.sampling_factor) {
            args.push("-sampling-factor".to_string());
            args.push(sampling.to_string());
        }
        if let Some(quality) = self.quality.filter(|q| *q > 0) {
            args.push("-quality".to_string());
            args.push(quality.to_string());
        }
        if let Some(interlace) = non_empty(&self.interlace) {
            args.push("-interlace".to_string());
            args.push(interlace.to_string());
        }
        if let Some(filter) = non_empty(&self.filter) {
            args.push("-filter".to_string());
            args.push(filter.to_string());
        }
        if self.strip {
            args.push("-strip".to_string());
        }
        args
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// A ready-to-run invocation: program, argument vector, working directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResizeCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl fmt::Display for ResizeCommand {
    /// Shell-like rendering for logs. The command is never run through a
    /// shell.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            f.write_str(" ")?;
            match arg.as_str() {
                "(" => f.write_str("\\(")?,
                ")" => f.write_str("\\)")?,
                "null:" => f.write_str("null:")?,
                other if needs_quoting(other) => write!(f, "'{}'", other.replace('\'', "'\\''"))?,
                other => f.write_str(other)?,
            }
        }
        Ok(())
    }
}

fn needs_quoting(arg: &str) -> bool {
    arg.is_empty()
        || !arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./+=,@%".contains(c))
}

#[derive(Clone, Debug)]
struct SourceGroup {
    source: PathBuf,
    variations: Vec<Variation>,
}

/// Accumulates resize entries for one invocation.
///
/// Cloning an empty builder is how the scheduler obtains a fresh batch; the
/// rendered options are shared between clones.
#[derive(Clone, Debug)]
pub struct ProcessBuilder {
    program: String,
    options: Arc<[String]>,
    base_path: Option<PathBuf>,
    limit: usize,
    groups: Vec<SourceGroup>,
    entries: usize,
}

impl ProcessBuilder {
    pub fn new(program: impl Into<String>, options: &ResizeOptions, limit: usize) -> Self {
        Self {
            program: program.into(),
            options: options.render().into(),
            base_path: None,
            limit,
            groups: Vec::new(),
            entries: 0,
        }
    }

    /// Paths under `base_path` are written relative to it and the command
    /// runs inside it.
    pub fn with_base_path(mut self, base_path: impl Into<PathBuf>) -> Self {
        let base_path = base_path.into();
        self.base_path = (!base_path.as_os_str().is_empty()).then_some(base_path);
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of distinct targets accumulated so far.
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn is_full(&self) -> bool {
        self.entries >= self.limit
    }

    pub fn sources(&self) -> impl Iterator<Item = &Path> {
        self.groups.iter().map(|group| group.source.as_path())
    }

    /// Add one entry. A target already present for the same source keeps its
    /// position and takes the new size.
    pub fn push_resize(&mut self, source: &Path, target: &Path, width: u32, height: u32) {
        let index = match self.groups.iter().position(|g| g.source == source) {
            Some(index) => index,
            None => {
                self.groups.push(SourceGroup {
                    source: source.to_path_buf(),
                    variations: Vec::new(),
                });
                self.groups.len() - 1
            }
        };

        let variations = &mut self.groups[index].variations;
        match variations.iter_mut().find(|v| v.target == target) {
            Some(existing) => {
                existing.width = width;
                existing.height = height;
            }
            None => {
                variations.push(Variation::new(target, width, height));
                self.entries += 1;
            }
        }
    }

    pub fn with_resize(mut self, source: &Path, target: &Path, width: u32, height: u32) -> Self {
        self.push_resize(source, target, width, height);
        self
    }

    pub fn build(&self) -> ResizeCommand {
        let mut args = Vec::with_capacity(self.entries * (6 + self.options.len()) + 1);

        for group in &self.groups {
            let mut variations: Vec<&Variation> = group.variations.iter().collect();
            // stable: equal areas keep insertion order
            variations.sort_by(|a, b| b.area().cmp(&a.area()));

            args.push("(".to_string());
            args.push(self.relative(&group.source));
            args.push("-colorspace".to_string());
            args.push("sRGB".to_string());
            for variation in variations {
                args.push("-resize".to_string());
                args.push(geometry(variation.width, variation.height));
                args.extend(self.options.iter().cloned());
                args.push("-write".to_string());
                args.push(self.relative(&variation.target));
            }
            args.push(")".to_string());
        }
        args.push("null:".to_string());

        ResizeCommand {
            program: self.program.clone(),
            args,
            working_dir: self.base_path.clone(),
        }
    }

    fn relative(&self, path: &Path) -> String {
        let stripped = self
            .base_path
            .as_deref()
            .and_then(|base| path.strip_prefix(base).ok())
            .unwrap_or(path);
        stripped.to_string_lossy().into_owned()
    }
}

/// `WxH`, or `xH` / `W` when one side is left to the aspect ratio.
fn geometry(width: u32, height: u32) -> String {
    match (width, height) {
        (0, h) => format!("x{h}"),
        (w, 0) => w.to_string(),
        (w, h) => format!("{w}x{h}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder(limit: usize) -> ProcessBuilder {
        ProcessBuilder::new("convert", &ResizeOptions::default(), limit)
    }

    fn rendered(builder: &ProcessBuilder) -> String {
        builder.build().to_string()
    }

    fn p(path: &str) -> &Path {
        Path::new(path)
    }

    #[test]
    fn empty_builder_renders_sink_only() {
        assert_eq!(rendered(&builder(10)), "convert null:");
    }

    #[test]
    fn single_source() {
        let b = builder(10).with_resize(p("original.jpg"), p("original300x400.jpg"), 300, 400);
        assert_eq!(
            rendered(&b),
            "convert \\( original.jpg -colorspace sRGB -resize 300x400 -write original300x400.jpg \\) null:"
        );
        assert_eq!(
            b.build().args,
            vec![
                "(",
                "original.jpg",
                "-colorspace",
                "sRGB",
                "-resize",
                "300x400",
                "-write",
                "original300x400.jpg",
                ")",
                "null:"
            ]
        );
    }

    #[test]
    fn groups_same_source_and_sorts_by_area() {
        let b = builder(10)
            .with_resize(p("original1.jpg"), p("original1-big.jpg"), 600, 700)
            .with_resize(p("original2.jpg"), p("original2-thumb.jpg"), 150, 150)
            .with_resize(p("original1.jpg"), p("original1-thumb.jpg"), 150, 150)
            .with_resize(p("original1.jpg"), p("original1-small.jpg"), 300, 400);
        assert_eq!(
            rendered(&b),
            "convert \
             \\( original1.jpg -colorspace sRGB -resize 600x700 -write original1-big.jpg \
             -resize 300x400 -write original1-small.jpg \
             -resize 150x150 -write original1-thumb.jpg \\) \
             \\( original2.jpg -colorspace sRGB -resize 150x150 -write original2-thumb.jpg \\) null:"
        );
    }

    #[test]
    fn equal_areas_keep_insertion_order() {
        let b = builder(10)
            .with_resize(p("o.jpg"), p("small.jpg"), 300, 400)
            .with_resize(p("o.jpg"), p("big.jpg"), 600, 700)
            .with_resize(p("o.jpg"), p("small-second.jpg"), 400, 300);
        assert_eq!(
            rendered(&b),
            "convert \\( o.jpg -colorspace sRGB -resize 600x700 -write big.jpg \
             -resize 300x400 -write small.jpg \
             -resize 400x300 -write small-second.jpg \\) null:"
        );
    }

    #[test]
    fn strips_base_path_by_component() {
        let b = builder(10)
            .with_base_path("/top/directory")
            .with_resize(
                p("/top/directory/original3.jpg"),
                p("/top/directory/original3-big.jpg"),
                600,
                700,
            )
            .with_resize(
                p("/top/directory2/original3.jpg"),
                p("/top/directory2/original3-medium.jpg"),
                500,
                600,
            );
        let command = b.build();
        assert_eq!(command.working_dir.as_deref(), Some(p("/top/directory")));
        assert_eq!(
            command.to_string(),
            "convert \
             \\( original3.jpg -colorspace sRGB -resize 600x700 -write original3-big.jpg \\) \
             \\( /top/directory2/original3.jpg -colorspace sRGB -resize 500x600 \
             -write /top/directory2/original3-medium.jpg \\) null:"
        );
    }

    #[test]
    fn renders_options_on_every_step_in_fixed_order() {
        let options = ResizeOptions {
            sampling_factor: Some("4:2:0".to_string()),
            quality: Some(95),
            interlace: Some("JPEG".to_string()),
            filter: Some("Lanczos".to_string()),
            strip: true,
        };
        let b = ProcessBuilder::new("convert", &options, 10)
            .with_resize(p("o.jpg"), p("big.jpg"), 600, 700)
            .with_resize(p("o.jpg"), p("thumb.jpg"), 150, 150);
        let flags = "-sampling-factor '4:2:0' -quality 95 -interlace JPEG -filter Lanczos -strip";
        assert_eq!(
            rendered(&b),
            format!(
                "convert \\( o.jpg -colorspace sRGB -resize 600x700 {flags} -write big.jpg \
                 -resize 150x150 {flags} -write thumb.jpg \\) null:"
            )
        );
    }

    #[test]
    fn empty_or_zero_options_are_skipped() {
        let options = ResizeOptions {
            sampling_factor: Some(String::new()),
            quality: Some(0),
            ..ResizeOptions::default()
        };
        assert!(options.render().is_empty());
    }

    #[test]
    fn open_width_renders_height_only_geometry() {
        let b = builder(10).with_resize(p("o.jpg"), p("t.jpg"), 0, 400);
        assert!(rendered(&b).contains("-resize x400 -write t.jpg"));
    }

    #[test]
    fn full_exactly_at_limit() {
        let mut b = builder(3);
        b.push_resize(p("1.jpg"), p("1-a.jpg"), 10, 10);
        b.push_resize(p("1.jpg"), p("1-b.jpg"), 20, 20);
        assert!(!b.is_full());
        b.push_resize(p("2.jpg"), p("2-a.jpg"), 10, 10);
        assert!(b.is_full());
        assert_eq!(b.len(), 3);
    }

    #[test]
    fn duplicate_target_replaces_size_without_counting() {
        let b = builder(2)
            .with_resize(p("o.jpg"), p("t.jpg"), 10, 10)
            .with_resize(p("o.jpg"), p("t.jpg"), 20, 20);
        assert_eq!(b.len(), 1);
        assert!(!b.is_full());
        assert!(rendered(&b).contains("-resize 20x20 -write t.jpg"));
        assert!(!rendered(&b).contains("10x10"));
    }

    #[test]
    fn clones_do_not_share_entries() {
        let template = builder(10);
        let mut first = template.clone();
        first.push_resize(p("o.jpg"), p("t.jpg"), 10, 10);
        assert!(template.is_empty());
        assert_eq!(template.clone().build().to_string(), "convert null:");
    }
}
