/*!
# Factory Console

Client de synchronisation d'état pour le backend de l'usine :
- détient le dernier snapshot poussé
- superpose l'état local (alertes, sélection)
- envoie les commandes opérateur en REST
- sert les vues dérivées à une couche de rendu
*/

pub mod alerts;
pub mod api;
pub mod chat;
pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod http;
pub mod hub;
pub mod models;
pub mod selection;
pub mod store;
pub mod views;

pub use api::{BackendClient, MachineCommand};
pub use commands::CommandDispatcher;
pub use config::ConsoleConfig;
pub use connection::{ConnectionManager, ConnectionState, Connector, WsConnector};
pub use hub::{FactoryHub, HubEvent};
