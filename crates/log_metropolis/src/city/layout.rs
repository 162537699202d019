use std::collections::HashSet;

/// Assigns fixed grid placement to entities in the order they are first seen.
///
/// Slots follow a square spiral around the origin so the city grows outward
/// evenly. Cells already claimed by an explicit placement are skipped.
#[derive(Debug, Clone)]
pub struct GridLayout {
    spacing: f32,
    next_slot: u64,
    occupied: HashSet<(i64, i64)>,
}

impl GridLayout {
    pub fn new(spacing: f32) -> Self {
        Self {
            spacing,
            next_slot: 0,
            occupied: HashSet::new(),
        }
    }

    pub fn spacing(&self) -> f32 {
        self.spacing
    }

    /// Records an externally chosen position so automatic slots avoid it.
    pub fn claim(&mut self, grid_x: f32, grid_z: f32) {
        self.occupied.insert(self.cell_of(grid_x, grid_z));
    }

    pub fn next_position(&mut self) -> (f32, f32) {
        loop {
            let (cell_x, cell_z) = spiral_cell(self.next_slot);
            self.next_slot += 1;
            if self.occupied.insert((cell_x, cell_z)) {
                return (cell_x as f32 * self.spacing, cell_z as f32 * self.spacing);
            }
        }
    }

    fn cell_of(&self, grid_x: f32, grid_z: f32) -> (i64, i64) {
        (
            (grid_x / self.spacing).round() as i64,
            (grid_z / self.spacing).round() as i64,
        )
    }
}

/// Cell coordinates of the `index`-th slot of a square spiral starting at (0, 0).
pub fn spiral_cell(index: u64) -> (i64, i64) {
    if index == 0 {
        return (0, 0);
    }

    let mut ring: i64 = 1;
    while ((2 * ring + 1) * (2 * ring + 1)) as u64 <= index {
        ring += 1;
    }

    let ring_start = ((2 * ring - 1) * (2 * ring - 1)) as u64;
    let offset = (index - ring_start) as i64;
    let side = 2 * ring;

    match offset / side {
        0 => (ring, -ring + 1 + offset),
        1 => (ring - 1 - (offset - side), ring),
        2 => (-ring, ring - 1 - (offset - 2 * side)),
        _ => (-ring + 1 + (offset - 3 * side), -ring),
    }
}
