//! Per-step output of the discrete fields.

use std::path::{Path, PathBuf};

use vtkio::model::{
    Attribute, Attributes, ByteOrder, CellType, Cells, DataArrayBase, DataSet, ElementType, IOBuffer,
    UnstructuredGridPiece, Version, VertexNumbers, Vtk,
};

use crate::dofs::Discretization;
use crate::prelude::*;

/// Destination for the fields of a completed time step
pub trait OutputSink {
    fn write(&mut self, step: usize, disc: &Discretization, fields: &[(&str, &VectorD)]) -> Result<()>;
}

/// Discards all output
#[derive(Debug, Clone, Copy, Default)]
pub struct NullOutput;

impl OutputSink for NullOutput {
    fn write(&mut self, _step: usize, _disc: &Discretization, _fields: &[(&str, &VectorD)]) -> Result<()> {
        Ok(())
    }
}

/// Writes `solution-NNN.vtk` files into a directory
#[derive(Debug, Clone)]
pub struct VtkOutput {
    directory: PathBuf,
}

impl VtkOutput {
    pub fn new(directory: impl AsRef<Path>) -> Self {
        VtkOutput {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    pub fn file_name(step: usize) -> String {
        format!("solution-{:03}.vtk", step)
    }
}

impl OutputSink for VtkOutput {
    fn write(&mut self, step: usize, disc: &Discretization, fields: &[(&str, &VectorD)]) -> Result<()> {
        std::fs::create_dir_all(&self.directory)?;
        let path = self.directory.join(Self::file_name(step));
        solution_vtk(disc, fields, step)?
            .export_ascii(&path)
            .map_err(|e| Error::Output(format!("{}: {:?}", path.display(), e)))?;
        log::debug!("wrote {}", path.display());
        Ok(())
    }
}

/// Unstructured grid of the active cells with one point array per field
pub fn solution_vtk(disc: &Discretization, fields: &[(&str, &VectorD)], step: usize) -> Result<Vtk> {
    for (_, field) in fields.iter() {
        if field.len() != disc.n_dofs() {
            return Err(Error::DimensionMismatch {
                what: "output field",
                expected: disc.n_dofs(),
                found: field.len(),
            });
        }
    }

    // VTK quads run counter-clockwise, local vertices run x fastest
    let connectivity = (0..disc.n_active_cells())
        .flat_map(|k| {
            let dofs = disc.cell_dofs(k);
            [dofs[0], dofs[1], dofs[3], dofs[2]].map(|d| d as u64)
        })
        .collect_vec();

    Ok(Vtk {
        version: Version { major: 4, minor: 2 },
        title: format!("step {}", step),
        byte_order: ByteOrder::LittleEndian,
        file_path: None,
        data: DataSet::inline(UnstructuredGridPiece {
            points: IOBuffer::F64(
                disc.support_points()
                    .iter()
                    .flat_map(|p| [p.x, p.y, 0.])
                    .collect_vec(),
            ),
            cells: Cells {
                cell_verts: VertexNumbers::XML {
                    connectivity,
                    offsets: (1..=disc.n_active_cells()).map(|k| 4 * k as u64).collect_vec(),
                },
                types: vec![CellType::Quad; disc.n_active_cells()],
            },
            data: Attributes {
                point: fields
                    .iter()
                    .map(|&(name, field)| {
                        Attribute::DataArray(DataArrayBase {
                            name: name.to_string(),
                            elem: ElementType::Scalars {
                                num_comp: 1,
                                lookup_table: None,
                            },
                            data: IOBuffer::F64(field.as_slice().to_vec()),
                        })
                    })
                    .collect_vec(),
                ..Default::default()
            },
        }),
    })
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::mesh::Mesh;
    use vtkio::model::Piece;

    #[test]
    fn test_file_name() {
        assert_eq!(VtkOutput::file_name(7), "solution-007.vtk");
        assert_eq!(VtkOutput::file_name(1234), "solution-1234.vtk");
    }

    #[test]
    fn test_solution_vtk() {
        let mut mesh = Mesh::hyper_cube(-1., 1.);
        mesh.refine_global(1);
        let disc = Discretization::distribute(mesh, 1).unwrap();
        let u = VectorD::from_element(disc.n_dofs(), 1.);
        let vtk = solution_vtk(&disc, &[("U", &u), ("V", &u)], 3).unwrap();

        let DataSet::UnstructuredGrid { pieces, .. } = vtk.data else {
            panic!("expected an unstructured grid");
        };
        let Piece::Inline(piece) = &pieces[0] else {
            panic!("expected inline data");
        };
        assert_eq!(piece.points.len(), 3 * 9);
        assert_eq!(piece.cells.types.len(), 4);
        assert_eq!(piece.data.point.len(), 2);

        let wrong = VectorD::zeros(3);
        assert!(matches!(
            solution_vtk(&disc, &[("U", &wrong)], 0),
            Err(Error::DimensionMismatch { expected: 9, found: 3, .. })
        ));
    }

    #[test]
    fn test_write_files() {
        let directory = std::env::temp_dir().join(format!("wave_amr_output_{}", std::process::id()));
        let mut mesh = Mesh::hyper_cube(0., 1.);
        mesh.refine_global(1);
        let disc = Discretization::distribute(mesh, 1).unwrap();
        let u = VectorD::zeros(disc.n_dofs());

        let mut output = VtkOutput::new(&directory);
        output.write(0, &disc, &[("U", &u)]).unwrap();
        assert!(directory.join("solution-000.vtk").exists());
        let _ = std::fs::remove_dir_all(&directory);
    }
}
