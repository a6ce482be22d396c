/// Bearer token authentication and the HTTP caller extractor.
pub mod auth_service;
/// Fan-out of server messages to room sockets.
pub mod broadcast;
/// Routing and checking of inbound WebSocket events.
pub mod coordinator;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Room creation, membership and question bank seeding.
pub mod room_service;
/// Team question rounds and the answer countdown.
pub mod round_service;
/// Background connection and health supervision of the room store.
pub mod storage_supervisor;
/// WebSocket connection and message handling service.
pub mod websocket_service;
