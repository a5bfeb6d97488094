/*
 * Conversions between wire messages and domain types.
 *
 * Grids travel as row-major byte frames; alive sets travel as repeated
 * coordinates. Errors travel as tonic status codes chosen so that the
 * receiving side recovers the same retryability.
 */

use crate::generated::{
    CellCoord, ComputeStripRequest, ControlResponse, GridFrame, JobResultResponse,
    StatusResponse, TerminateResponse, TickResponse, WorkerFailure,
};
use gol_common::{
    AliveSet, Cell, ControlReport, GolError, Grid, JobReport, Result, RowRange, ShutdownReport,
    StatusReport, TickReport,
};
use tonic::{Code, Status};

const TERMINATED_MESSAGE: &str = "broker terminated";

impl From<&Grid> for GridFrame {
    fn from(grid: &Grid) -> Self {
        GridFrame {
            width: grid.width(),
            height: grid.height(),
            cells: grid.as_bytes().to_vec(),
        }
    }
}

impl TryFrom<GridFrame> for Grid {
    type Error = GolError;

    fn try_from(frame: GridFrame) -> Result<Self> {
        Grid::from_bytes(frame.width, frame.height, frame.cells)
    }
}

/// Decodes an optional grid field, treating absence as a protocol error.
pub fn grid_from_wire(frame: Option<GridFrame>) -> Result<Grid> {
    frame
        .ok_or_else(|| GolError::Protocol("request is missing its grid".into()))?
        .try_into()
}

impl From<Cell> for CellCoord {
    fn from(cell: Cell) -> Self {
        CellCoord {
            x: cell.x,
            y: cell.y,
        }
    }
}

impl From<CellCoord> for Cell {
    fn from(coord: CellCoord) -> Self {
        Cell::new(coord.x, coord.y)
    }
}

pub fn alive_to_wire(alive: AliveSet) -> Vec<CellCoord> {
    alive.into_iter().map(CellCoord::from).collect()
}

pub fn alive_from_wire(cells: Vec<CellCoord>) -> AliveSet {
    cells.into_iter().map(Cell::from).collect()
}

impl ComputeStripRequest {
    /// Builds the request for one worker's strip of `grid`.
    pub fn for_strip(grid: &Grid, rows: RowRange) -> Self {
        ComputeStripRequest {
            grid: Some(GridFrame::from(grid)),
            strip_offset: rows.offset,
            strip_height: rows.height,
        }
    }

    pub fn rows(&self) -> RowRange {
        RowRange::new(self.strip_offset, self.strip_height)
    }
}

impl From<JobReport> for JobResultResponse {
    fn from(report: JobReport) -> Self {
        JobResultResponse {
            completed_turns: report.completed_turns,
            alive_cells: alive_to_wire(report.alive),
        }
    }
}

impl From<JobResultResponse> for JobReport {
    fn from(resp: JobResultResponse) -> Self {
        JobReport {
            completed_turns: resp.completed_turns,
            alive: alive_from_wire(resp.alive_cells),
        }
    }
}

impl From<StatusReport> for StatusResponse {
    fn from(report: StatusReport) -> Self {
        StatusResponse {
            working: report.working,
            turn: report.turn,
        }
    }
}

impl From<StatusResponse> for StatusReport {
    fn from(resp: StatusResponse) -> Self {
        StatusReport {
            working: resp.working,
            turn: resp.turn,
        }
    }
}

impl From<TickReport> for TickResponse {
    fn from(report: TickReport) -> Self {
        TickResponse {
            turn: report.turn,
            alive_count: report.alive_count,
        }
    }
}

impl From<TickResponse> for TickReport {
    fn from(resp: TickResponse) -> Self {
        TickReport {
            turn: resp.turn,
            alive_count: resp.alive_count,
        }
    }
}

impl From<ControlReport> for ControlResponse {
    fn from(report: ControlReport) -> Self {
        ControlResponse {
            turn: report.turn,
            working: report.working,
        }
    }
}

impl From<ControlResponse> for ControlReport {
    fn from(resp: ControlResponse) -> Self {
        ControlReport {
            turn: resp.turn,
            working: resp.working,
        }
    }
}

impl From<ShutdownReport> for TerminateResponse {
    fn from(report: ShutdownReport) -> Self {
        TerminateResponse {
            workers_notified: report.notified,
            workers_failed: report
                .failed
                .into_iter()
                .map(|(worker, error)| WorkerFailure { worker, error })
                .collect(),
        }
    }
}

impl From<TerminateResponse> for ShutdownReport {
    fn from(resp: TerminateResponse) -> Self {
        ShutdownReport {
            notified: resp.workers_notified,
            failed: resp
                .workers_failed
                .into_iter()
                .map(|f| (f.worker, f.error))
                .collect(),
        }
    }
}

/// Maps a domain error onto the status code a remote caller should see.
pub fn status_from_error(err: &GolError) -> Status {
    let message = err.to_string();
    match err {
        GolError::Communication(_) => Status::unavailable(message),
        GolError::Timeout(_) => Status::deadline_exceeded(message),
        GolError::ResourceExhausted(_) => Status::resource_exhausted(message),
        GolError::InvalidGrid(_) | GolError::Config(_) => Status::invalid_argument(message),
        GolError::Protocol(_) => Status::failed_precondition(message),
        GolError::Terminated => Status::aborted(TERMINATED_MESSAGE),
        GolError::JobFailed(_) => Status::aborted(message),
        GolError::Worker(_)
        | GolError::Serialization(_)
        | GolError::Io(_)
        | GolError::Unexpected(_) => Status::internal(message),
    }
}

/// Maps a status received from a remote peer back onto a domain error.
pub fn error_from_status(status: Status) -> GolError {
    let message = status.message().to_string();
    match status.code() {
        Code::Unavailable | Code::Cancelled | Code::DeadlineExceeded | Code::Unknown => {
            GolError::Communication(format!("{:?}: {}", status.code(), message))
        }
        Code::ResourceExhausted => GolError::ResourceExhausted(message),
        Code::InvalidArgument => GolError::InvalidGrid(message),
        Code::FailedPrecondition | Code::Unimplemented => GolError::Protocol(message),
        Code::Aborted if message == TERMINATED_MESSAGE => GolError::Terminated,
        Code::Aborted => GolError::JobFailed(message),
        _ => GolError::Unexpected(format!("{:?}: {}", status.code(), message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_frame_round_trip() {
        let alive = AliveSet::from(vec![Cell::new(0, 0), Cell::new(2, 1)]);
        let grid = Grid::from_alive(3, 2, &alive).unwrap();

        let frame = GridFrame::from(&grid);
        assert_eq!(frame.cells, vec![0xFF, 0, 0, 0, 0, 0xFF]);

        let decoded = Grid::try_from(frame).unwrap();
        assert_eq!(decoded, grid);
    }

    #[test]
    fn test_short_frame_rejected() {
        let frame = GridFrame {
            width: 4,
            height: 4,
            cells: vec![0; 3],
        };
        assert!(matches!(Grid::try_from(frame), Err(GolError::InvalidGrid(_))));
        assert!(matches!(grid_from_wire(None), Err(GolError::Protocol(_))));
    }

    #[test]
    fn test_strip_request_carries_rows() {
        let grid = Grid::new(8, 8).unwrap();
        let req = ComputeStripRequest::for_strip(&grid, RowRange::new(4, 2));
        assert_eq!(req.rows(), RowRange::new(4, 2));
        assert_eq!(req.grid.unwrap().cells.len(), 64);
    }

    #[test]
    fn test_status_mapping_keeps_retryability() {
        let retryable = [
            GolError::Communication("reset".into()),
            GolError::ResourceExhausted("busy".into()),
        ];
        for err in retryable {
            assert!(error_from_status(status_from_error(&err)).is_retryable());
        }

        let terminated = error_from_status(status_from_error(&GolError::Terminated));
        assert!(matches!(terminated, GolError::Terminated));

        let bad = error_from_status(status_from_error(&GolError::InvalidGrid("x".into())));
        assert!(!bad.is_retryable());
    }

    #[test]
    fn test_shutdown_report_conversion() {
        let report = ShutdownReport {
            notified: vec!["w0".into()],
            failed: vec![("w1".into(), "unreachable".into())],
        };
        let back = ShutdownReport::from(TerminateResponse::from(report.clone()));
        assert_eq!(back, report);
    }
}
