//! Small netCDF day files laid out like the MERRA-2 hourly collections.

use std::error::Error;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use ros_common::LatLonGrid;

/// Fill value written on every field variable, as MERRA-2 does.
pub const FILL_VALUE: f32 = 1.0e15;

pub const HOURS_PER_DAY: usize = 24;

/// File name of a MERRA-2 hourly collection file, e.g.
/// `MERRA2_400.tavg1_2d_lnd_Nx.20010130.nc4`.
pub fn merra2_file_name(collection: &str, date: NaiveDate) -> String {
    format!(
        "MERRA2_400.tavg1_2d_{}_Nx.{}.nc4",
        collection,
        date.format("%Y%m%d")
    )
}

/// Path of a land (`lnd`) or single-level (`slv`) file under `dir`.
pub fn merra2_path(dir: &Path, collection: &str, date: NaiveDate) -> PathBuf {
    dir.join(merra2_file_name(collection, date))
}

/// Write a day file with `time`, `lat` and `lon` dimensions, coordinate
/// variables, and one `(time, lat, lon)` f32 variable per entry.
///
/// Each variable holds `24 * lats * lons` values in time-major order.
pub fn write_day_file(
    path: &Path,
    grid: &LatLonGrid,
    variables: &[(&str, Vec<f32>)],
) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = netcdf::create(path)?;
    file.add_dimension("time", HOURS_PER_DAY)?;
    file.add_dimension("lat", grid.lats.len())?;
    file.add_dimension("lon", grid.lons.len())?;

    {
        let mut lat = file.add_variable::<f64>("lat", &["lat"])?;
        lat.put_values(&grid.lats, ..)?;
    }
    {
        let mut lon = file.add_variable::<f64>("lon", &["lon"])?;
        lon.put_values(&grid.lons, ..)?;
    }

    for (name, values) in variables {
        let mut var = file.add_variable::<f32>(name, &["time", "lat", "lon"])?;
        var.put_attribute("_FillValue", FILL_VALUE)?;
        var.put_values(values, ..)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_matches_merra2_convention() {
        let date = NaiveDate::from_ymd_opt(2001, 1, 30).unwrap();
        assert_eq!(
            merra2_file_name("lnd", date),
            "MERRA2_400.tavg1_2d_lnd_Nx.20010130.nc4"
        );
    }
}
