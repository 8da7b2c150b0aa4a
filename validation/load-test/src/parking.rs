//! Parking API tasks.
//!
//! Each task is a pure function from a random source to the requests it
//! sends, so request bodies can be checked without a server.

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::config::TaskWeight;
use crate::error::{SetupError, SetupResult};
use crate::session::ApiRequest;
use crate::tasks::{Operation, TaskRegistry};

/// Parking floors exposed by `/api/spots`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Floor {
    B1,
    B2,
    B3,
}

impl Floor {
    pub const ALL: [Floor; 3] = [Floor::B1, Floor::B2, Floor::B3];

    pub fn as_str(&self) -> &'static str {
        match self {
            Floor::B1 => "B1",
            Floor::B2 => "B2",
            Floor::B3 => "B3",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    Car,
    Bike,
}

/// Body of `POST /api/park`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkRequest {
    pub spot_id: String,
    pub license_plate: String,
    #[serde(rename = "type")]
    pub vehicle_type: VehicleType,
}

/// Body of `POST /api/exit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitRequest {
    pub spot_id: String,
}

/// Spots per floor.
pub const SPOTS_PER_FLOOR: u32 = 15;

/// Requests issued by one stress batch.
pub const STRESS_BATCH_SIZE: usize = 5;

pub const VIEW_DASHBOARD: &str = "view_dashboard";
pub const VIEW_PARKING_SPOTS: &str = "view_parking_spots";
pub const PARK_VEHICLE: &str = "park_vehicle";
pub const VEHICLE_EXIT: &str = "vehicle_exit";
pub const VIEW_HISTORY: &str = "view_history";
pub const SWITCH_THEME: &str = "switch_theme";
pub const RAPID_PARKING_OPERATIONS: &str = "rapid_parking_operations";

/// Every task name a scenario may reference.
pub const KNOWN_TASKS: [&str; 7] = [
    VIEW_DASHBOARD,
    VIEW_PARKING_SPOTS,
    PARK_VEHICLE,
    VEHICLE_EXIT,
    VIEW_HISTORY,
    SWITCH_THEME,
    RAPID_PARKING_OPERATIONS,
];

/// `B1-07` style spot id.
pub fn spot_id(floor: Floor, number: u32) -> String {
    format!("{}-{:02}", floor.as_str(), number)
}

fn random_spot(rng: &mut dyn RngCore, floor: Floor) -> String {
    spot_id(floor, rng.gen_range(1..=SPOTS_PER_FLOOR))
}

fn random_plate(rng: &mut dyn RngCore, prefix: &str) -> String {
    format!("{}-{}", prefix, rng.gen_range(1000..=9999))
}

fn random_vehicle(rng: &mut dyn RngCore) -> VehicleType {
    if rng.gen_bool(0.5) {
        VehicleType::Car
    } else {
        VehicleType::Bike
    }
}

pub fn view_dashboard(_: &mut dyn RngCore) -> Vec<ApiRequest> {
    vec![ApiRequest::get("/dashboard")]
}

pub fn view_parking_spots(rng: &mut dyn RngCore) -> Vec<ApiRequest> {
    let floor = Floor::ALL.choose(rng).copied().unwrap_or(Floor::B1);
    vec![ApiRequest::get(format!("/api/spots?floor={}", floor.as_str()))]
}

pub fn park_vehicle(rng: &mut dyn RngCore) -> Vec<ApiRequest> {
    let body = ParkRequest {
        spot_id: random_spot(rng, Floor::B1),
        license_plate: random_plate(rng, "TEST"),
        vehicle_type: random_vehicle(rng),
    };
    vec![ApiRequest::post_json("/api/park", &body)]
}

pub fn vehicle_exit(rng: &mut dyn RngCore) -> Vec<ApiRequest> {
    let body = ExitRequest {
        spot_id: random_spot(rng, Floor::B1),
    };
    vec![ApiRequest::post_json("/api/exit", &body)]
}

pub fn view_history(_: &mut dyn RngCore) -> Vec<ApiRequest> {
    vec![ApiRequest::get("/api/history")]
}

pub fn switch_theme(_: &mut dyn RngCore) -> Vec<ApiRequest> {
    vec![ApiRequest::post("/api/theme")]
}

/// Composite task: a burst of park requests across all floors.
pub fn rapid_parking_operations(rng: &mut dyn RngCore) -> Vec<ApiRequest> {
    (0..STRESS_BATCH_SIZE)
        .map(|_| {
            let floor = Floor::ALL.choose(&mut *rng).copied().unwrap_or(Floor::B1);
            let body = ParkRequest {
                spot_id: random_spot(&mut *rng, floor),
                license_plate: random_plate(&mut *rng, "STRESS"),
                vehicle_type: random_vehicle(&mut *rng),
            };
            ApiRequest::post_json("/api/park", &body)
        })
        .collect()
}

/// Look up the operation behind a task name.
pub fn operation(name: &str) -> Option<Operation> {
    let op: Operation = match name {
        VIEW_DASHBOARD => Arc::new(view_dashboard),
        VIEW_PARKING_SPOTS => Arc::new(view_parking_spots),
        PARK_VEHICLE => Arc::new(park_vehicle),
        VEHICLE_EXIT => Arc::new(vehicle_exit),
        VIEW_HISTORY => Arc::new(view_history),
        SWITCH_THEME => Arc::new(switch_theme),
        RAPID_PARKING_OPERATIONS => Arc::new(rapid_parking_operations),
        _ => return None,
    };
    Some(op)
}

/// Build a registry from a configured weight table.
pub fn build_registry(table: &[TaskWeight]) -> SetupResult<TaskRegistry> {
    let mut builder = TaskRegistry::builder();
    for entry in table {
        let op = operation(&entry.name).ok_or_else(|| SetupError::UnknownTask {
            name: entry.name.clone(),
            known: KNOWN_TASKS.join(", "),
        })?;
        builder = builder.register_shared(entry.name.clone(), entry.weight, op);
    }
    builder.build()
}

/// Think-time browsing mix.
pub fn default_normal_tasks() -> Vec<TaskWeight> {
    vec![
        TaskWeight::new(VIEW_DASHBOARD, 3),
        TaskWeight::new(VIEW_PARKING_SPOTS, 2),
        TaskWeight::new(PARK_VEHICLE, 1),
        TaskWeight::new(VEHICLE_EXIT, 1),
        TaskWeight::new(VIEW_HISTORY, 2),
        TaskWeight::new(SWITCH_THEME, 1),
    ]
}

pub fn default_stress_tasks() -> Vec<TaskWeight> {
    vec![TaskWeight::new(RAPID_PARKING_OPERATIONS, 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use reqwest::Method;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(11)
    }

    fn spot_number(spot: &str) -> u32 {
        spot[3..].parse().unwrap()
    }

    #[test]
    fn test_spot_id_is_zero_padded() {
        assert_eq!(spot_id(Floor::B1, 7), "B1-07");
        assert_eq!(spot_id(Floor::B3, 15), "B3-15");
    }

    #[test]
    fn test_park_body_shape() {
        let mut rng = rng();
        for _ in 0..200 {
            let reqs = park_vehicle(&mut rng);
            assert_eq!(reqs.len(), 1);
            assert_eq!(reqs[0].method, Method::POST);
            assert_eq!(reqs[0].path, "/api/park");

            let body: ParkRequest =
                serde_json::from_value(reqs[0].body.clone().unwrap()).unwrap();
            assert!(body.spot_id.starts_with("B1-"));
            assert!((1..=15).contains(&spot_number(&body.spot_id)));
            let plate: u32 = body.license_plate.trim_start_matches("TEST-").parse().unwrap();
            assert!((1000..=9999).contains(&plate));
        }
    }

    #[test]
    fn test_park_body_uses_wire_names() {
        let reqs = park_vehicle(&mut rng());
        let body = reqs[0].body.as_ref().unwrap();
        assert!(body.get("spotId").is_some());
        assert!(body.get("licensePlate").is_some());
        let ty = body["type"].as_str().unwrap();
        assert!(ty == "car" || ty == "bike");
    }

    #[test]
    fn test_exit_targets_b1_spot() {
        let reqs = vehicle_exit(&mut rng());
        assert_eq!(reqs[0].path, "/api/exit");
        let spot = reqs[0].body.as_ref().unwrap()["spotId"].as_str().unwrap();
        assert!(spot.starts_with("B1-"));
    }

    #[test]
    fn test_spots_floor_is_in_enumeration() {
        let mut rng = rng();
        for _ in 0..50 {
            let reqs = view_parking_spots(&mut rng);
            let floor = reqs[0].path.trim_start_matches("/api/spots?floor=");
            assert!(["B1", "B2", "B3"].contains(&floor), "floor {floor}");
        }
    }

    #[test]
    fn test_theme_has_no_body() {
        let reqs = switch_theme(&mut rng());
        assert_eq!(reqs[0].method, Method::POST);
        assert!(reqs[0].body.is_none());
    }

    #[test]
    fn test_rapid_parking_is_a_batch_of_five() {
        let reqs = rapid_parking_operations(&mut rng());
        assert_eq!(reqs.len(), STRESS_BATCH_SIZE);
        for req in reqs {
            let body: ParkRequest = serde_json::from_value(req.body.unwrap()).unwrap();
            assert!(body.license_plate.starts_with("STRESS-"));
            assert!(["B1", "B2", "B3"].contains(&&body.spot_id[..2]));
        }
    }

    #[test]
    fn test_default_registry_matches_browsing_mix() {
        let reg = build_registry(&default_normal_tasks()).unwrap();
        assert_eq!(reg.len(), 6);
        assert_eq!(reg.total_weight(), 10);
        assert_eq!(reg.tasks()[0].name, VIEW_DASHBOARD);
        assert_eq!(reg.tasks()[0].weight, 3);
    }

    #[test]
    fn test_unknown_task_is_setup_error() {
        let err = build_registry(&[TaskWeight::new("fly_drone", 1)]).unwrap_err();
        assert!(matches!(err, SetupError::UnknownTask { ref name, .. } if name == "fly_drone"));
    }

    #[test]
    fn test_every_known_task_resolves() {
        for name in KNOWN_TASKS {
            assert!(operation(name).is_some(), "{name}");
        }
    }
}
