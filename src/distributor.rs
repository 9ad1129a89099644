//! Distribution of field data over the ranks of a process group.
//!
//! A [`Layout`] is a plain value describing how data with a given global spatial shape is split
//! into contiguous blocks along one *distributed* axis. All other axes are process-local. The
//! [`Distributor`] owns the communicator and memoizes one layout per basis tuple.
use crate::basis::Basis;
use crate::coords::{Coordinate, CoordinateSystem};
use crate::error::SpectralError;
use crate::util::{block_range, extract_range, insert_range};
use log::trace;
use num::complex::Complex64;
use num::Zero;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use spectris_comm::{Communicator, SelfComm};
use std::ops::Range;
use std::sync::Arc;

/// Partition of a global spatial index space over a process group.
///
/// Data buffers described by a layout carry a leading component axis in front of the spatial
/// axes; the component axis is never distributed. A layout is only distributed if the group has
/// more than one rank and at least two spatial axes have more than one entry, so that any
/// distributed axis can always be exchanged for another one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Layout {
    global_shape: Vec<usize>,
    distributed_axis: Option<usize>,
    rank: usize,
    num_ranks: usize,
}

impl Layout {
    pub fn new(global_shape: Vec<usize>, rank: usize, num_ranks: usize) -> Self {
        let distributable: Vec<_> = (0..global_shape.len())
            .filter(|&axis| global_shape[axis] > 1)
            .collect();
        let distributed_axis = if num_ranks > 1 && distributable.len() >= 2 {
            Some(distributable[0])
        } else {
            None
        };
        Self {
            global_shape,
            distributed_axis,
            rank,
            num_ranks,
        }
    }

    pub fn global_shape(&self) -> &[usize] {
        &self.global_shape
    }

    /// The axis that is distributed when data is at rest in this layout.
    pub fn distributed_axis(&self) -> Option<usize> {
        self.distributed_axis
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn num_ranks(&self) -> usize {
        self.num_ranks
    }

    pub fn is_distributed(&self) -> bool {
        self.distributed_axis.is_some()
    }

    /// Another axis that `axis` can be exchanged with in a transpose.
    pub fn alternate_axis(&self, axis: usize) -> Option<usize> {
        (0..self.global_shape.len()).find(|&other| other != axis && self.global_shape[other] > 1)
    }

    /// Index range along `axis` owned by `rank` when data is distributed along `distributed`.
    pub fn range_of(&self, distributed: Option<usize>, axis: usize, rank: usize) -> Range<usize> {
        let n = self.global_shape[axis];
        if distributed == Some(axis) {
            block_range(n, self.num_ranks, rank)
        } else {
            0..n
        }
    }

    pub fn local_range(&self, distributed: Option<usize>, axis: usize) -> Range<usize> {
        self.range_of(distributed, axis, self.rank)
    }

    /// Local spatial shape when data is distributed along `distributed`.
    pub fn local_shape(&self, distributed: Option<usize>) -> Vec<usize> {
        (0..self.global_shape.len())
            .map(|axis| self.local_range(distributed, axis).len())
            .collect()
    }

    fn buffer_shape(&self, components: usize, distributed: Option<usize>) -> Vec<usize> {
        let mut shape = vec![components];
        shape.extend(self.local_shape(distributed));
        shape
    }

    /// Exchanges the distributed axis of `data` from `from` to `to`.
    ///
    /// This is a collective operation and must be called by every rank of `comm`.
    pub fn transpose(
        &self,
        comm: &dyn Communicator,
        data: &[Complex64],
        components: usize,
        from: usize,
        to: usize,
    ) -> Vec<Complex64> {
        trace!("rank {}: transpose axis {} -> {}", self.rank, from, to);
        let shape = self.buffer_shape(components, Some(from));
        let send = (0..self.num_ranks)
            .map(|q| extract_range(data, &shape, to + 1, self.range_of(Some(to), to, q)))
            .collect();
        let received = comm.all_to_all(send);

        let new_shape = self.buffer_shape(components, Some(to));
        let mut output = vec![Complex64::zero(); new_shape.iter().product()];
        for (q, block) in received.into_iter().enumerate() {
            let range = self.range_of(Some(from), from, q);
            insert_range(&mut output, &new_shape, from + 1, range.start, &block, range.len());
        }
        output
    }

    /// Collects the full extent of the distributed axis `from` on every rank.
    pub fn gather(&self, comm: &dyn Communicator, data: &[Complex64], components: usize, from: usize) -> Vec<Complex64> {
        trace!("rank {}: gather axis {}", self.rank, from);
        let received = comm.all_gather(data.to_vec());
        let new_shape = self.buffer_shape(components, None);
        let mut output = vec![Complex64::zero(); new_shape.iter().product()];
        for (q, block) in received.into_iter().enumerate() {
            let range = self.range_of(Some(from), from, q);
            insert_range(&mut output, &new_shape, from + 1, range.start, &block, range.len());
        }
        output
    }

    /// Keeps only the local block along `to` of fully local data.
    pub fn scatter(&self, data: &[Complex64], components: usize, to: usize) -> Vec<Complex64> {
        let shape = self.buffer_shape(components, None);
        extract_range(data, &shape, to + 1, self.local_range(Some(to), to))
    }

    /// Moves data distributed along `from` to be distributed along `to`.
    pub fn redistribute(
        &self,
        comm: &dyn Communicator,
        data: Vec<Complex64>,
        components: usize,
        from: Option<usize>,
        to: Option<usize>,
    ) -> Vec<Complex64> {
        match (from, to) {
            (Some(from), Some(to)) if from != to => self.transpose(comm, &data, components, from, to),
            (Some(from), None) => self.gather(comm, &data, components, from),
            (None, Some(to)) => self.scatter(&data, components, to),
            _ => data,
        }
    }
}

/// Owns the process group and the coordinate systems that fields are defined over.
///
/// The spatial axes of every field are the coordinates of all coordinate systems, in order.
#[derive(Debug)]
pub struct Distributor {
    coord_systems: Vec<CoordinateSystem>,
    coords: Vec<Coordinate>,
    comm: Arc<dyn Communicator>,
    layouts: Mutex<FxHashMap<Vec<Option<Basis>>, Arc<Layout>>>,
}

/// Builder for [`Distributor`].
#[derive(Debug, Default)]
pub struct DistributorBuilder {
    coord_systems: Vec<CoordinateSystem>,
    comm: Option<Arc<dyn Communicator>>,
}

impl DistributorBuilder {
    pub fn with_coordinate_system(mut self, coords: &CoordinateSystem) -> Self {
        self.coord_systems.push(coords.clone());
        self
    }

    pub fn with_communicator(mut self, comm: impl Communicator + 'static) -> Self {
        self.comm = Some(Arc::new(comm));
        self
    }

    pub fn with_shared_communicator(mut self, comm: Arc<dyn Communicator>) -> Self {
        self.comm = Some(comm);
        self
    }

    pub fn build(self) -> Result<Distributor, SpectralError> {
        let comm = self.comm.unwrap_or_else(|| Arc::new(SelfComm));
        Distributor::with_communicator(self.coord_systems, comm)
    }
}

impl Distributor {
    /// A single-process distributor over the given coordinate systems.
    pub fn new(coord_systems: Vec<CoordinateSystem>) -> Result<Self, SpectralError> {
        Self::with_communicator(coord_systems, Arc::new(SelfComm))
    }

    pub fn builder() -> DistributorBuilder {
        DistributorBuilder::default()
    }

    pub fn with_communicator(
        coord_systems: Vec<CoordinateSystem>,
        comm: Arc<dyn Communicator>,
    ) -> Result<Self, SpectralError> {
        if coord_systems.is_empty() {
            return Err(SpectralError::InvalidCoordinateSystem(
                "a distributor needs at least one coordinate system".to_string(),
            ));
        }
        let mut coords: Vec<Coordinate> = Vec::new();
        for coord in coord_systems.iter().flat_map(|cs| cs.coords()) {
            if coords.contains(coord) {
                return Err(SpectralError::InvalidCoordinateSystem(format!(
                    "coordinate '{coord}' appears in more than one coordinate system"
                )));
            }
            coords.push(coord.clone());
        }
        Ok(Self {
            coord_systems,
            coords,
            comm,
            layouts: Mutex::new(FxHashMap::default()),
        })
    }

    pub fn coordinate_systems(&self) -> &[CoordinateSystem] {
        &self.coord_systems
    }

    /// All spatial coordinates, in axis order.
    pub fn coords(&self) -> &[Coordinate] {
        &self.coords
    }

    pub fn dim(&self) -> usize {
        self.coords.len()
    }

    /// Spatial axis of the given coordinate.
    pub fn axis_of(&self, coord: &Coordinate) -> Result<usize, SpectralError> {
        self.coords
            .iter()
            .position(|c| c == coord)
            .ok_or_else(|| SpectralError::BasisNotPresent(format!("coordinate '{coord}' is not part of this distributor")))
    }

    pub fn comm(&self) -> &dyn Communicator {
        self.comm.as_ref()
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn num_ranks(&self) -> usize {
        self.comm.size()
    }

    /// Returns the layout of fields over the given per-axis bases, where `None` marks a
    /// basis-less (constant) axis.
    ///
    /// # Panics
    ///
    /// Panics if `bases.len()` differs from the number of spatial axes.
    pub fn get_layout(&self, bases: &[Option<Basis>]) -> Arc<Layout> {
        assert_eq!(bases.len(), self.dim(), "one entry per spatial axis is required");
        let mut layouts = self.layouts.lock();
        layouts
            .entry(bases.to_vec())
            .or_insert_with(|| {
                let shape = bases
                    .iter()
                    .map(|basis| basis.as_ref().map(Basis::size).unwrap_or(1))
                    .collect();
                Arc::new(Layout::new(shape, self.rank(), self.num_ranks()))
            })
            .clone()
    }
}
