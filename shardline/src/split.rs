//! Split-file naming conventions.
//!
//! Large model artifacts are published as numbered shards named
//! `<base>-<NNNNN>-of-<MMMMM>.<ext>`, e.g. `llama-00001-of-00003.gguf`.
//! Requesting any one shard downloads all of them, so a logical filename is
//! expanded into the full ordered list of physical shard names before
//! anything else happens.
//!
//! Everything here is pure string handling with no I/O.

use std::sync::OnceLock;

use regex::Regex;

/// Minimum zero-padding width of the numeric shard fields.
pub const MIN_PART_PADDING: usize = 5;

/// Largest shard count a group may request. Detection itself accepts any
/// count; callers that expand untrusted names check against this first.
pub const MAX_SPLIT_PARTS: u32 = 1024;

fn split_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(.+)-(\d+)-of-(\d+)\.([^./\\]+)$").expect("split pattern is valid")
    })
}

/// Parsed components of a shard filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitInfo {
    /// Everything before the `-<N>-of-<M>` suffix.
    pub base_name: String,
    /// The shard number carried by the parsed name (1-based).
    pub current_part: u32,
    /// Total number of shards.
    pub total_parts: u32,
    /// Zero-padding width used for both numeric fields.
    pub padding: usize,
    /// File extension without the leading dot.
    pub extension: String,
}

impl SplitInfo {
    /// Build the physical filename of shard `part`.
    ///
    /// # Examples
    ///
    /// ```
    /// use shardline::split::detect_split_file;
    ///
    /// let info = detect_split_file("llama-00001-of-00003.gguf").unwrap();
    /// assert_eq!(info.part_filename(2), "llama-00002-of-00003.gguf");
    /// ```
    pub fn part_filename(&self, part: u32) -> String {
        format!(
            "{}-{:0width$}-of-{:0width$}.{}",
            self.base_name,
            part,
            self.total_parts,
            self.extension,
            width = self.padding
        )
    }

    /// All shard filenames in order, `1..=total_parts`.
    pub fn filenames(&self) -> Vec<String> {
        (1..=self.total_parts)
            .map(|part| self.part_filename(part))
            .collect()
    }
}

/// Detect whether a filename follows the shard naming pattern.
///
/// Returns `None` for ordinary filenames, and also when the numeric fields
/// cannot be parsed or the total part count is zero; callers treat such
/// names as a single file.
///
/// # Examples
///
/// ```
/// use shardline::split::detect_split_file;
///
/// let info = detect_split_file("llama-00001-of-00003.gguf").unwrap();
/// assert_eq!(info.base_name, "llama");
/// assert_eq!(info.total_parts, 3);
/// assert_eq!(info.padding, 5);
///
/// assert!(detect_split_file("model.gguf").is_none());
/// ```
pub fn detect_split_file(filename: &str) -> Option<SplitInfo> {
    let captures = split_pattern().captures(filename)?;

    let current_str = captures.get(2)?.as_str();
    let total_str = captures.get(3)?.as_str();

    let current_part = current_str.parse::<u32>().ok()?;
    let total_parts = total_str.parse::<u32>().ok()?;
    if total_parts < 1 {
        return None;
    }

    Some(SplitInfo {
        base_name: captures.get(1)?.as_str().to_string(),
        current_part,
        total_parts,
        padding: MIN_PART_PADDING.max(current_str.len()).max(total_str.len()),
        extension: captures.get(4)?.as_str().to_string(),
    })
}

/// Expand one logical filename into its physical filenames.
///
/// Shard names expand to every shard of the set; anything else comes back
/// unchanged as a single-element list.
///
/// # Examples
///
/// ```
/// use shardline::split::expand_split_filename;
///
/// assert_eq!(
///     expand_split_filename("foo-00002-of-00002.gguf"),
///     vec!["foo-00001-of-00002.gguf", "foo-00002-of-00002.gguf"]
/// );
/// assert_eq!(expand_split_filename("mmproj.gguf"), vec!["mmproj.gguf"]);
/// ```
pub fn expand_split_filename(filename: &str) -> Vec<String> {
    match detect_split_file(filename) {
        Some(info) => info.filenames(),
        None => vec![filename.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_split_filename_is_identity() {
        assert!(detect_split_file("model.gguf").is_none());
        assert_eq!(expand_split_filename("model.gguf"), vec!["model.gguf"]);
    }

    #[test]
    fn test_detects_pattern_and_padding() {
        let info = detect_split_file("llama-00001-of-00003.gguf").unwrap();
        assert_eq!(info.base_name, "llama");
        assert_eq!(info.current_part, 1);
        assert_eq!(info.total_parts, 3);
        assert_eq!(info.padding, 5);
        assert_eq!(info.extension, "gguf");
    }

    #[test]
    fn test_generates_all_parts_with_padding() {
        assert_eq!(
            expand_split_filename("foo-00001-of-00003.gguf"),
            vec![
                "foo-00001-of-00003.gguf",
                "foo-00002-of-00003.gguf",
                "foo-00003-of-00003.gguf",
            ]
        );
    }

    #[test]
    fn test_short_fields_are_padded_to_minimum() {
        assert_eq!(
            expand_split_filename("foo-1-of-2.gguf"),
            vec!["foo-00001-of-00002.gguf", "foo-00002-of-00002.gguf"]
        );
    }

    #[test]
    fn test_wide_fields_keep_their_width() {
        let parts = expand_split_filename("big-0000001-of-0000002.bin");
        assert_eq!(
            parts,
            vec!["big-0000001-of-0000002.bin", "big-0000002-of-0000002.bin"]
        );
    }

    #[test]
    fn test_zero_total_parts_falls_back_to_single() {
        assert_eq!(
            expand_split_filename("foo-00001-of-00000.gguf"),
            vec!["foo-00001-of-00000.gguf"]
        );
    }

    #[test]
    fn test_unparseable_number_falls_back_to_single() {
        let name = "foo-1-of-99999999999999999999.gguf";
        assert!(detect_split_file(name).is_none());
        assert_eq!(expand_split_filename(name), vec![name]);
    }

    #[test]
    fn test_base_may_contain_dots_and_dashes() {
        let info = detect_split_file("Qwen2.5-7B-Q4_K_M-00002-of-00004.gguf").unwrap();
        assert_eq!(info.base_name, "Qwen2.5-7B-Q4_K_M");
        assert_eq!(info.current_part, 2);
        assert_eq!(info.total_parts, 4);
    }

    #[test]
    fn test_missing_extension_is_not_split() {
        assert!(detect_split_file("foo-00001-of-00003").is_none());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_expansion_roundtrip(
                base in "[a-zA-Z][a-zA-Z0-9_.]{0,12}",
                total in 1u32..200,
                current_offset in 0u32..200,
                width_n in 1usize..8,
                width_m in 1usize..8,
            ) {
                let current = current_offset % total + 1;
                let n = format!("{:0w$}", current, w = width_n);
                let m = format!("{:0w$}", total, w = width_m);
                let filename = format!("{}-{}-of-{}.gguf", base, n, m);
                let padding = MIN_PART_PADDING.max(n.len()).max(m.len());

                let parts = expand_split_filename(&filename);
                prop_assert_eq!(parts.len(), total as usize);

                for (i, part) in parts.iter().enumerate() {
                    let info = detect_split_file(part).expect("expanded part parses");
                    prop_assert_eq!(&info.base_name, &base);
                    prop_assert_eq!(info.current_part, i as u32 + 1);
                    prop_assert_eq!(info.total_parts, total);
                    prop_assert_eq!(info.padding, padding);
                }
            }

            #[test]
            fn test_non_matching_is_identity(name in "[a-zA-Z0-9_.]{1,24}") {
                prop_assert_eq!(expand_split_filename(&name), vec![name.clone()]);
            }
        }
    }
}
