/// Position in world tiles. `z` increases "up" the screen.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorldPosition {
    pub x: f64,
    pub z: f64,
}

impl WorldPosition {
    pub const fn new(x: f64, z: f64) -> Self {
        Self { x, z }
    }

    pub fn distance_to(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        (dx * dx + dz * dz).sqrt()
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.z.is_finite()
    }
}

/// Integer tile coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TilePosition {
    pub x: i64,
    pub z: i64,
}

impl TilePosition {
    pub const fn new(x: i64, z: i64) -> Self {
        Self { x, z }
    }
}

impl From<WorldPosition> for TilePosition {
    fn from(pos: WorldPosition) -> Self {
        Self::new(pos.x.floor() as i64, pos.z.floor() as i64)
    }
}

/// 4-way facing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Facing {
    North = 0,
    East = 1,
    #[default]
    South = 2,
    West = 3,
}

impl Facing {
    /// Facing implied by a movement delta; `None` when the move is too small
    /// to have a direction.
    pub fn from_delta(dx: f64, dz: f64) -> Option<Self> {
        const MIN_MOVE: f64 = 0.01;
        if dx.abs() < MIN_MOVE && dz.abs() < MIN_MOVE {
            return None;
        }
        Some(if dx.abs() >= dz.abs() {
            if dx > 0.0 { Self::East } else { Self::West }
        } else if dz > 0.0 {
            Self::North
        } else {
            Self::South
        })
    }

    /// Quarter turns clockwise from north.
    pub fn quarter_turns(self) -> u8 {
        self as u8
    }
}

/// World-space rectangle, `min` inclusive and `max` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorldRect {
    pub min: WorldPosition,
    pub max: WorldPosition,
}

impl WorldRect {
    pub fn new(min_x: f64, min_z: f64, max_x: f64, max_z: f64) -> Self {
        Self {
            min: WorldPosition::new(min_x, min_z),
            max: WorldPosition::new(max_x, max_z),
        }
    }

    pub fn expand(self, margin: f64) -> Self {
        Self::new(self.min.x - margin, self.min.z - margin, self.max.x + margin, self.max.z + margin)
    }

    pub fn contains(&self, pos: WorldPosition) -> bool {
        pos.x >= self.min.x && pos.x < self.max.x && pos.z >= self.min.z && pos.z < self.max.z
    }

    /// True if the footprint `[x, x+w) x [z, z+d)` touches this rectangle.
    pub fn intersects(&self, x: f64, z: f64, w: f64, d: f64) -> bool {
        x < self.max.x && x + w > self.min.x && z < self.max.z && z + d > self.min.z
    }
}

/// Color (RGBA, 0-255)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    /// Parse the colour spellings found in thing payloads:
    /// `#rrggbb`, `#rrggbbaa`, `r,g,b[,a]` (0-255 or 0-1 floats) and
    /// `RGBA(r, g, b, a)`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix('#') {
            return Self::parse_hex(hex);
        }

        let inner = match s.find('(') {
            Some(open) => s[open + 1..].strip_suffix(')')?,
            None => s,
        };
        let parts: Vec<f64> = inner
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .ok()?;
        if parts.len() < 3 || parts.len() > 4 || parts.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return None;
        }

        let unit = parts.iter().all(|v| *v <= 1.0);
        let channel = |v: f64| -> u8 {
            let v = if unit { v * 255.0 } else { v };
            v.round().clamp(0.0, 255.0) as u8
        };
        let a = parts.get(3).map(|&v| channel(v)).unwrap_or(255);
        Some(Self::new(channel(parts[0]), channel(parts[1]), channel(parts[2]), a))
    }

    fn parse_hex(hex: &str) -> Option<Self> {
        if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
            return None;
        }
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        let a = if hex.len() == 8 { byte(6)? } else { 255 };
        Some(Self::new(byte(0)?, byte(2)?, byte(4)?, a))
    }
}
