// Aggregates all former standalone integration tests as modules.
mod http_inventory;
mod submit_flow;
