//! Conflict resolution
//!
//! A resolver receives the whole content of a file holding conflict markers
//! and returns the content to stage in its place.

/// Marker opening our side of a conflict
pub const CONFLICT_MARKER: &str = "<<<<<<<";

const BASE_MARKER: &str = "|||||||";
const SEPARATOR: &str = "=======";
const END_MARKER: &str = ">>>>>>>";

/// Turns a conflicted file into its resolved content
pub trait ConflictResolver {
    /// # Errors
    /// Returns an error when the conflict cannot be resolved
    fn resolve(&mut self, content: &str) -> anyhow::Result<String>;
}

impl<F> ConflictResolver for F
where
    F: FnMut(&str) -> anyhow::Result<String>,
{
    fn resolve(&mut self, content: &str) -> anyhow::Result<String> {
        self(content)
    }
}

/// Resolves every conflict by keeping one side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideResolver {
    /// The target branch's version
    Ours,
    /// The replayed edit's version
    Theirs,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Outside,
    Ours,
    Base,
    Theirs,
}

impl SideResolver {
    /// Keep one side of each conflict hunk, dropping the markers
    #[must_use]
    pub fn keep_side(self, content: &str) -> String {
        let mut section = Section::Outside;
        let mut out = String::with_capacity(content.len());
        for line in content.split_inclusive('\n') {
            let marker = line.trim_end();
            section = match section {
                Section::Outside if marker.starts_with(CONFLICT_MARKER) => Section::Ours,
                Section::Ours if marker.starts_with(BASE_MARKER) => Section::Base,
                Section::Ours | Section::Base if marker == SEPARATOR => Section::Theirs,
                Section::Theirs if marker.starts_with(END_MARKER) => Section::Outside,
                current => {
                    let keep = match current {
                        Section::Outside => true,
                        Section::Ours => self == Self::Ours,
                        Section::Theirs => self == Self::Theirs,
                        Section::Base => false,
                    };
                    if keep {
                        out.push_str(line);
                    }
                    current
                }
            };
        }
        out
    }
}

impl ConflictResolver for SideResolver {
    fn resolve(&mut self, content: &str) -> anyhow::Result<String> {
        Ok(self.keep_side(content))
    }
}
