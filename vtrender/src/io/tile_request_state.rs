//! Tile request state.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use crate::{coords::WorldTileCoords, io::TileRequestID};

/// A request which was handed to the packer and has not arrived yet.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub coords: WorldTileCoords,
    /// Cancelled when the tile is no longer wanted. The packer checks it between steps.
    pub token: CancellationToken,
}

/// Stores a map of pending requests and coalesces requests for the same tile.
#[derive(Debug)]
pub struct TileRequestState {
    current_id: TileRequestID,
    pending_tile_requests: HashMap<TileRequestID, PendingRequest>,
    pending_coords: HashMap<WorldTileCoords, TileRequestID>,
}

impl Default for TileRequestState {
    fn default() -> Self {
        Self::new()
    }
}

impl TileRequestState {
    pub fn new() -> Self {
        Self {
            current_id: 1,
            pending_tile_requests: Default::default(),
            pending_coords: Default::default(),
        }
    }

    pub fn is_tile_request_pending(&self, coords: &WorldTileCoords) -> bool {
        self.pending_coords.contains_key(coords)
    }

    /// Registers a request. Returns `None` when one is already in flight for the tile.
    pub fn start_tile_request(
        &mut self,
        coords: WorldTileCoords,
    ) -> Option<(TileRequestID, CancellationToken)> {
        if self.is_tile_request_pending(&coords) {
            log::debug!("request for tile {coords} coalesced");
            return None;
        }

        let id = self.current_id;
        self.current_id = self.current_id.wrapping_add(1).max(1);

        let token = CancellationToken::new();
        self.pending_coords.insert(coords, id);
        self.pending_tile_requests.insert(
            id,
            PendingRequest {
                coords,
                token: token.clone(),
            },
        );
        Some((id, token))
    }

    /// Completes a request. `None` means the request was cancelled and its result is stale.
    pub fn finish_tile_request(&mut self, id: TileRequestID) -> Option<PendingRequest> {
        let request = self.pending_tile_requests.remove(&id)?;
        self.pending_coords.remove(&request.coords);
        if request.token.is_cancelled() {
            return None;
        }
        Some(request)
    }

    /// Cancels the in-flight request of a tile, if any.
    pub fn cancel_tile_request(&mut self, coords: &WorldTileCoords) -> bool {
        let Some(id) = self.pending_coords.remove(coords) else {
            return false;
        };
        if let Some(request) = self.pending_tile_requests.remove(&id) {
            request.token.cancel();
            log::debug!("request {id} for tile {coords} cancelled");
        }
        true
    }

    pub fn cancel_all(&mut self) {
        for (_, request) in self.pending_tile_requests.drain() {
            request.token.cancel();
        }
        self.pending_coords.clear();
    }

    pub fn pending_count(&self) -> usize {
        self.pending_tile_requests.len()
    }
}

#[cfg(test)]
mod tests {
    use crate::{coords::WorldTileCoords, io::tile_request_state::TileRequestState};

    #[test]
    fn test_requests_are_coalesced() {
        let mut state = TileRequestState::new();
        let coords = WorldTileCoords::new(1, 2, 3);

        let (id, _) = state.start_tile_request(coords).unwrap();
        assert!(state.start_tile_request(coords).is_none());
        assert!(state.is_tile_request_pending(&coords));

        assert_eq!(state.finish_tile_request(id).unwrap().coords, coords);
        assert!(!state.is_tile_request_pending(&coords));
        assert!(state.start_tile_request(coords).is_some());
    }

    #[test]
    fn test_cancelled_results_are_stale() {
        let mut state = TileRequestState::new();
        let coords = WorldTileCoords::new(0, 0, 1);

        let (id, token) = state.start_tile_request(coords).unwrap();
        assert!(state.cancel_tile_request(&coords));
        assert!(token.is_cancelled());
        assert!(state.finish_tile_request(id).is_none());

        let (other, _) = state.start_tile_request(coords).unwrap();
        assert_ne!(id, other);
    }

    #[test]
    fn test_cancel_all() {
        let mut state = TileRequestState::new();
        let tokens: Vec<_> = (0..3)
            .map(|x| state.start_tile_request(WorldTileCoords::new(x, 0, 2)).unwrap().1)
            .collect();

        state.cancel_all();
        assert_eq!(state.pending_count(), 0);
        assert!(tokens.iter().all(|token| token.is_cancelled()));
    }
}
