use super::geometry::GeometryMapper;
use super::store::CityStore;

/// What the highlight should look like this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HighlightCommand {
    Hide,
    Show { position: [f32; 3], scale: [f32; 3] },
}

impl HighlightCommand {
    pub fn is_visible(&self) -> bool {
        matches!(self, HighlightCommand::Show { .. })
    }
}

/// Host-side sink for highlight commands. Implementations only copy values
/// onto their visual and make no decisions of their own.
pub trait HighlightVisual {
    fn apply(&mut self, command: &HighlightCommand);
}

/// Host-independent highlight state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HighlightHandle {
    pub visible: bool,
    pub position: [f32; 3],
    pub scale: [f32; 3],
}

impl HighlightVisual for HighlightHandle {
    fn apply(&mut self, command: &HighlightCommand) {
        match *command {
            HighlightCommand::Hide => self.visible = false,
            HighlightCommand::Show { position, scale } => {
                self.position = position;
                self.scale = scale;
                self.visible = true;
            }
        }
    }
}

/// Computes the highlight for the current hover target.
///
/// A missing or dangling hover id hides the highlight; it is never left at a
/// stale position.
pub fn sync_highlight(store: &CityStore, mapper: &GeometryMapper) -> HighlightCommand {
    let Some(state) = store.hovered_building() else {
        return HighlightCommand::Hide;
    };
    let volume = mapper.highlight_volume(state);
    HighlightCommand::Show {
        position: volume.center,
        scale: volume.size,
    }
}

/// Per-frame driver of the hover highlight. The only writer of the visual.
#[derive(Debug, Clone)]
pub struct FrameSynchronizer {
    mapper: GeometryMapper,
    last: Option<HighlightCommand>,
}

impl FrameSynchronizer {
    pub fn new(mapper: GeometryMapper) -> Self {
        Self { mapper, last: None }
    }

    pub fn mapper(&self) -> &GeometryMapper {
        &self.mapper
    }

    pub fn last_command(&self) -> Option<HighlightCommand> {
        self.last
    }

    /// Runs one frame. Returns `true` when the command differs from the last frame.
    pub fn tick<V: HighlightVisual + ?Sized>(&mut self, store: &CityStore, visual: &mut V) -> bool {
        let command = sync_highlight(store, &self.mapper);
        visual.apply(&command);
        let changed = self.last != Some(command);
        self.last = Some(command);
        changed
    }
}

impl Default for FrameSynchronizer {
    fn default() -> Self {
        Self::new(GeometryMapper::default())
    }
}
