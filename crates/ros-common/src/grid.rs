//! Grid geometry, the dense cell arena and hourly input snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bbox::LatLonBox;
use crate::error::{CommonError, CommonResult};

/// Dimensions of a row-major 2-D grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridShape {
    /// Number of rows (latitudes)
    pub ny: usize,
    /// Number of columns (longitudes)
    pub nx: usize,
}

impl GridShape {
    pub fn new(ny: usize, nx: usize) -> Self {
        Self { ny, nx }
    }

    /// Total number of grid points.
    pub fn len(&self) -> usize {
        self.ny * self.nx
    }

    pub fn is_empty(&self) -> bool {
        self.ny == 0 || self.nx == 0
    }

    /// Row-major flat index for a (row, col) pair.
    pub fn flat_index(&self, row: usize, col: usize) -> usize {
        row * self.nx + col
    }
}

/// A regular latitude/longitude grid described by its 1-D axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatLonGrid {
    pub lats: Vec<f64>,
    pub lons: Vec<f64>,
}

impl LatLonGrid {
    pub fn new(lats: Vec<f64>, lons: Vec<f64>) -> Self {
        Self { lats, lons }
    }

    pub fn shape(&self) -> GridShape {
        GridShape::new(self.lats.len(), self.lons.len())
    }
}

/// Row/column position of a tracked cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellCoord {
    pub row: usize,
    pub col: usize,
}

/// Dense cell-id arena over the in-scope cells of a grid.
///
/// Cell ids run `0..len()` in row-major order of the selected cells, so
/// per-cell state can live in plain vectors indexed by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellIndex {
    shape: GridShape,
    coords: Vec<CellCoord>,
    flat: Vec<usize>,
}

impl CellIndex {
    /// Select cells that fall inside any box (every cell when `boxes` is
    /// empty) and whose `sample` value is finite.
    pub fn from_region(
        grid: &LatLonGrid,
        boxes: &[LatLonBox],
        sample: &[f32],
    ) -> CommonResult<Self> {
        let shape = grid.shape();
        if sample.len() != shape.len() {
            return Err(CommonError::ShapeMismatch {
                field: "region sample",
                expected: shape.len(),
                found: sample.len(),
            });
        }

        let mut coords = Vec::new();
        for (row, &lat) in grid.lats.iter().enumerate() {
            for (col, &lon) in grid.lons.iter().enumerate() {
                let in_region = boxes.is_empty() || boxes.iter().any(|b| b.contains(lon, lat));
                if in_region && sample[shape.flat_index(row, col)].is_finite() {
                    coords.push(CellCoord { row, col });
                }
            }
        }

        Self::from_coords(shape, coords)
    }

    /// Every cell of the grid.
    pub fn all(shape: GridShape) -> Self {
        let coords: Vec<CellCoord> = (0..shape.ny)
            .flat_map(|row| (0..shape.nx).map(move |col| CellCoord { row, col }))
            .collect();
        let flat = (0..shape.len()).collect();
        Self { shape, coords, flat }
    }

    /// Build from an explicit coordinate list (e.g. restored from a checkpoint).
    pub fn from_coords(shape: GridShape, coords: Vec<CellCoord>) -> CommonResult<Self> {
        if coords.is_empty() {
            return Err(CommonError::EmptyRegion);
        }
        let mut flat = Vec::with_capacity(coords.len());
        for c in &coords {
            if c.row >= shape.ny || c.col >= shape.nx {
                return Err(CommonError::CellOutOfBounds {
                    row: c.row,
                    col: c.col,
                    ny: shape.ny,
                    nx: shape.nx,
                });
            }
            flat.push(shape.flat_index(c.row, c.col));
        }
        Ok(Self { shape, coords, flat })
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    pub fn coord(&self, id: usize) -> CellCoord {
        self.coords[id]
    }

    pub fn coords(&self) -> &[CellCoord] {
        &self.coords
    }

    /// Flat grid index of a cell id.
    pub fn flat(&self, id: usize) -> usize {
        self.flat[id]
    }
}

/// The five hourly input fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    PrecipRate,
    SnowfallRate,
    SnowDepth,
    SurfaceTemp,
    AirTemp,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::PrecipRate,
        Field::SnowfallRate,
        Field::SnowDepth,
        Field::SurfaceTemp,
        Field::AirTemp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::PrecipRate => "precip_rate",
            Field::SnowfallRate => "snowfall_rate",
            Field::SnowDepth => "snow_depth",
            Field::SurfaceTemp => "surface_temp",
            Field::AirTemp => "air_temp",
        }
    }
}

/// One hour of gridded inputs, already in scan units.
///
/// Rates are mm/hr accumulated over the hour ending at `valid_time`,
/// snow depth is metres, temperatures are °C. All fields are row-major
/// over the full grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSnapshot {
    pub valid_time: DateTime<Utc>,
    pub shape: GridShape,
    pub precip_rate: Vec<f32>,
    pub snowfall_rate: Vec<f32>,
    pub snow_depth: Vec<f32>,
    pub surface_temp: Vec<f32>,
    pub air_temp: Vec<f32>,
}

impl GridSnapshot {
    pub fn field(&self, field: Field) -> &[f32] {
        match field {
            Field::PrecipRate => &self.precip_rate,
            Field::SnowfallRate => &self.snowfall_rate,
            Field::SnowDepth => &self.snow_depth,
            Field::SurfaceTemp => &self.surface_temp,
            Field::AirTemp => &self.air_temp,
        }
    }

    /// Check that every field matches `shape`.
    pub fn validate(&self, shape: &GridShape) -> CommonResult<()> {
        for field in Field::ALL {
            let found = self.field(field).len();
            if self.shape != *shape || found != shape.len() {
                return Err(CommonError::ShapeMismatch {
                    field: field.as_str(),
                    expected: shape.len(),
                    found,
                });
            }
        }
        Ok(())
    }
}
