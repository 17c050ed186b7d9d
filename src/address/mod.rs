//! Structural addressing of choice points
//!
//! A choice point is named by the path of enclosing call levels that led to it.
//! Each level contributes its site identity, how many loop iterations it has
//! counted so far, and the position inside it where control currently is. The
//! innermost position is the source location of the choice call itself.
//!
//! Call levels are explicit: [`scope`](crate::context::scope) pushes a frame
//! and pops it on exit, and [`loop_tick`](crate::context::loop_tick) bumps the
//! visit counter of a frame so that repeated visits to the same site get
//! distinct addresses.

use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Identity of a call site or program location
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SiteId {
    /// The root of a run
    Root,
    /// A source location captured with `#[track_caller]`
    Source {
        file: &'static str,
        line: u32,
        column: u32,
    },
    /// A user-supplied name
    Named(Arc<str>),
}

impl SiteId {
    /// Site of whoever called the enclosing `#[track_caller]` function
    #[track_caller]
    pub fn caller() -> Self {
        Self::from_location(Location::caller())
    }

    /// Site for a given source location
    pub fn from_location(location: &'static Location<'static>) -> Self {
        Self::Source {
            file: location.file(),
            line: location.line(),
            column: location.column(),
        }
    }

    /// Site identified by name rather than by source position
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Self::Named(name.into())
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => write!(f, "root"),
            Self::Source { file, line, column } => write!(f, "{}:{}:{}", file, line, column),
            Self::Named(name) => write!(f, "'{}'", name),
        }
    }
}

/// One call level's contribution to an address
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AddressSegment {
    /// Site that opened this level
    pub frame: SiteId,
    /// Loop counter of this level at the time of the choice
    pub visit: u64,
    /// Where inside this level control was
    pub position: SiteId,
}

impl fmt::Display for AddressSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.frame, self.visit, self.position)
    }
}

/// Structural address of a choice point, root to leaf
///
/// Segments are kept typed rather than joined into a string, so no choice of
/// separator can make two different paths compare equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(Arc<[AddressSegment]>);

impl Address {
    /// The empty address
    pub fn root() -> Self {
        Self(Arc::from(Vec::new()))
    }

    /// Build an address from explicit segments
    pub fn from_segments(segments: Vec<AddressSegment>) -> Self {
        Self(Arc::from(segments))
    }

    /// Segments from root to leaf
    pub fn segments(&self) -> &[AddressSegment] {
        &self.0
    }

    /// Number of call levels in the path
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Source position of the choice itself
    pub fn leaf(&self) -> Option<&SiteId> {
        self.0.last().map(|segment| &segment.position)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<root>");
        }
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct Frame {
    site: SiteId,
    visits: u64,
}

impl Frame {
    fn new(site: SiteId) -> Self {
        Self { site, visits: 0 }
    }
}

/// Call-path tracker for a single run
///
/// Holds the stack of open call levels, bottom being the run's root. Loop
/// counters live on the frames, so a fresh context per run resets them.
#[derive(Clone, Debug)]
pub struct AddressContext {
    frames: Vec<Frame>,
}

impl Default for AddressContext {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressContext {
    /// Create a context holding only the root frame
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::new(SiteId::Root)],
        }
    }

    /// Number of open levels, root included
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Open a nested call level entered from `site`
    pub fn enter(&mut self, site: SiteId) {
        self.frames.push(Frame::new(site));
    }

    /// Close the innermost call level. The root frame is never popped.
    pub fn exit(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Drop every level above `depth`
    pub fn truncate(&mut self, depth: usize) {
        self.frames.truncate(depth.max(1));
    }

    /// Increment the loop counter of the level `skip_frames` above the innermost
    pub fn increment_loop_counter(&mut self, skip_frames: usize) {
        let index = self.frames.len().saturating_sub(1 + skip_frames);
        self.frames[index].visits += 1;
    }

    /// Loop counter of the level `skip_frames` above the innermost
    pub fn loop_counter(&self, skip_frames: usize) -> u64 {
        let index = self.frames.len().saturating_sub(1 + skip_frames);
        self.frames[index].visits
    }

    /// Address of a choice made at `leaf`, ignoring the innermost `skip_frames` levels
    ///
    /// When levels are skipped, the position within the last kept level is the
    /// site through which the first skipped level was entered.
    pub fn current_address(&self, skip_frames: usize, leaf: SiteId) -> Address {
        let len = self.frames.len();
        let keep = len.saturating_sub(skip_frames).max(1);
        let mut segments = Vec::with_capacity(keep);

        for i in 0..keep {
            let position = if i + 1 < keep {
                self.frames[i + 1].site.clone()
            } else if keep == len {
                leaf.clone()
            } else {
                self.frames[keep].site.clone()
            };
            segments.push(AddressSegment {
                frame: self.frames[i].site.clone(),
                visit: self.frames[i].visits,
                position,
            });
        }

        Address::from_segments(segments)
    }
}
