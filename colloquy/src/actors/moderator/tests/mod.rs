mod actor_api;
mod support;
