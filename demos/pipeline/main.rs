//! Imports a synthetic structure set and walks it through every
//! representation.
//!
//! Run with `RUST_LOG=debug` for per-conversion detail.

use std::collections::HashMap;
use std::f64::consts::TAU;

use rtcontours::geometry::{ReferenceGrid, ReferenceGridId};
use rtcontours::math::{Point3, Vector3};
use rtcontours::operations::import::{ContourRecord, ImportParams, RegionRecord, StructureSetRecord};
use rtcontours::operations::query::ComputeMassProperties;
use rtcontours::representation::{ConversionParameter, RepresentationConverter, RepresentationKind};
use rtcontours::structure::StructureStore;
use tracing_subscriber::EnvFilter;

/// Circular contours of a sphere, one per 2 mm slice.
fn sphere_contours(radius: f64) -> Vec<ContourRecord> {
    let mut contours = Vec::new();
    let mut z = -radius + 1.0;
    while z < radius {
        let r = (radius * radius - z * z).sqrt();
        let points = (0..48)
            .flat_map(|i| {
                let a = TAU * f64::from(i) / 48.0;
                [r * a.cos(), r * a.sin(), z]
            })
            .collect();
        contours.push(ContourRecord {
            points,
            referenced_instance_uids: vec![format!("ct.{z}")],
        });
        z += 2.0;
    }
    contours
}

fn main() -> rtcontours::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,rtcontours=info")),
        )
        .init();

    let grid = ReferenceGrid::new(
        Point3::new(-40.0, -40.0, -40.0),
        Vector3::new(2.0, 2.0, 2.0),
        [41, 41, 41],
    )?;
    let registry = HashMap::from([(ReferenceGridId::new("ct.series"), grid)]);

    let record = StructureSetRecord {
        regions: vec![
            RegionRecord {
                number: 1,
                name: "Sphere".into(),
                description: "synthetic target".into(),
                frame_of_reference_uid: "1.2.840.1".into(),
                display_color: Some([255, 128, 0]),
                contours: sphere_contours(20.0),
            },
            RegionRecord {
                number: 2,
                name: "Marker".into(),
                description: String::new(),
                frame_of_reference_uid: "1.2.840.1".into(),
                display_color: None,
                contours: vec![ContourRecord {
                    points: vec![5.0, -3.0, 12.0],
                    referenced_instance_uids: Vec::new(),
                }],
            },
        ],
        referenced_series_uid: Some("ct.series".into()),
        frame_contour_image_uids: Vec::new(),
    };

    let mut store = StructureStore::new();
    let mut converter = RepresentationConverter::new();
    let imported =
        converter.import_structure_set(&mut store, &record, ImportParams::default(), &registry)?;
    println!(
        "imported {} structures, set spacing {:.2} mm",
        imported.structures.len(),
        imported.set_spacing
    );

    let sphere = imported.structures[0];
    let factor = converter.calculate_oversampling_factor(sphere, &store, &registry)?;
    println!("oversampling factor: {factor}");

    converter.request_representation(sphere, RepresentationKind::IndexedLabelVolume, &store, &registry)?;
    if let Some(volume) = converter
        .active_representation(sphere)?
        .and_then(|rep| rep.label_volume())
    {
        let label = store.structure(sphere)?.label_value();
        println!(
            "label volume: {} voxels, {:.0} mm^3",
            volume.count(label),
            volume.labeled_volume(label)
        );
    }

    converter.set_conversion_parameter(sphere, ConversionParameter::DecimationFactor(0.5))?;
    converter.request_representation(sphere, RepresentationKind::ClosedSurface, &store, &registry)?;
    if let Some(mesh) = converter.active_representation(sphere)?.and_then(|rep| rep.mesh()) {
        let props = ComputeMassProperties::new(mesh).execute()?;
        println!(
            "closed surface: {} triangles, volume {:.0} mm^3, area {:.0} mm^2, shape index {:.3}",
            mesh.triangle_count(),
            props.volume,
            props.surface_area,
            props.normalized_shape_index
        );
    }
    println!("counts: {:?}", converter.conversion_counts(sphere)?);

    let marker = imported.structures[1];
    if let Err(e) =
        converter.request_representation(marker, RepresentationKind::IndexedLabelVolume, &store, &registry)
    {
        println!("marker stays a point: {e}");
    }
    Ok(())
}
