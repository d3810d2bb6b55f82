//! The connection state machine.
//!
//! A connection owns its byte stream, splitter, compressor, and cipher, and
//! advances handshake → login → (configuration) → play. Inbound bytes are
//! decrypted, split, decompressed, and decoded by the current state's codec;
//! recognised packets trigger the automatic responses of the login
//! sub-protocol. Every state transition resets the splitter, because the
//! next frame belongs to the new state's codec.

use std::collections::VecDeque;

use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use mcje_crypto::{
    encrypt_pkcs1, generate_shared_secret, parse_public_key, server_hash, PacketCipher,
};
use mcje_proto::compression::Compressor;
use mcje_proto::framing::{frame, Splitter};
use mcje_proto::schema::{bytes_to_value, value_to_bytes};
use mcje_proto::{Direction, Packet, Protocol, State};

use crate::error::ClientError;
use crate::event::ClientEvent;
use crate::options::ClientOptions;
use crate::session;

/// Identity confirmed by `success`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub username: String,
    pub uuid: Uuid,
}

pub struct Connection<S> {
    stream: S,
    protocol: Protocol,
    options: ClientOptions,
    state: State,
    splitter: Splitter,
    compressor: Compressor,
    cipher: Option<PacketCipher>,
    profile: Option<Profile>,
    login_emitted: bool,
    queued: VecDeque<ClientEvent>,
    ended: bool,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    /// Wrap an established stream. The connection starts in the
    /// handshaking state with compression and encryption off.
    pub fn new(stream: S, protocol: Protocol, options: ClientOptions) -> Self {
        Self {
            stream,
            protocol,
            options,
            state: State::Handshaking,
            splitter: Splitter::new(),
            compressor: Compressor::disabled(),
            cipher: None,
            profile: None,
            login_emitted: false,
            queued: VecDeque::new(),
            ended: false,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    pub fn compression_threshold(&self) -> i32 {
        self.compressor.threshold()
    }

    pub fn protocol_version(&self) -> i32 {
        self.protocol.version()
    }

    // -------------------------------------------------------------------
    // Outbound
    // -------------------------------------------------------------------

    /// Serialise, compress, frame, encrypt, write. Byte-exact and in call
    /// order.
    pub async fn send(&mut self, name: &str, params: &Value) -> Result<(), ClientError> {
        let body = {
            let codec = self
                .protocol
                .codec(self.state, Direction::ToServer)
                .ok_or(ClientError::NoCodec {
                    state: self.state,
                    direction: Direction::ToServer,
                })?;
            codec.write(name, params)?
        };
        let body = self.compressor.encode(&body)?;
        let mut framed = frame(&body).to_vec();
        if let Some(cipher) = &mut self.cipher {
            cipher.encrypt(&mut framed);
        }
        self.stream.write_all(&framed).await?;
        self.stream.flush().await?;
        debug!(name, state = %self.state, bytes = framed.len(), "sent packet");
        Ok(())
    }

    /// Open the session: handshake into the login state and introduce
    /// ourselves.
    pub async fn start_login(&mut self) -> Result<(), ClientError> {
        let options = self.options.clone();
        self.send(
            "set_protocol",
            &json!({
                "protocolVersion": options.protocol_version,
                "serverHost": options.host,
                "serverPort": options.port,
                "nextState": 2,
            }),
        )
        .await?;
        self.set_state(State::Login);
        self.send(
            "login_start",
            &json!({
                "username": options.username,
                "playerUUID": options.player_uuid().to_string(),
            }),
        )
        .await?;
        Ok(())
    }

    /// Handshake into the status state (for pings).
    pub async fn start_status(&mut self) -> Result<(), ClientError> {
        let options = self.options.clone();
        self.send(
            "set_protocol",
            &json!({
                "protocolVersion": options.protocol_version,
                "serverHost": options.host,
                "serverPort": options.port,
                "nextState": 1,
            }),
        )
        .await?;
        self.set_state(State::Status);
        Ok(())
    }

    /// Drive the login to completion, discarding intermediate events, and
    /// return the confirmed profile. Use `next_event` instead to observe
    /// every step.
    pub async fn login(&mut self) -> Result<Profile, ClientError> {
        self.start_login().await?;
        loop {
            match self.next_event().await? {
                ClientEvent::Login { username, uuid } => {
                    return Ok(Profile { username, uuid });
                }
                ClientEvent::End { reason } => return Err(ClientError::Ended(reason)),
                _ => {}
            }
        }
    }

    // -------------------------------------------------------------------
    // Inbound
    // -------------------------------------------------------------------

    /// The next event, reading from the stream as needed. Events arrive in
    /// byte order; a state transition is delivered after the packet that
    /// caused it and before the next one.
    pub async fn next_event(&mut self) -> Result<ClientEvent, ClientError> {
        loop {
            if let Some(event) = self.queued.pop_front() {
                return Ok(event);
            }
            if self.ended {
                return Err(ClientError::Ended("connection closed".into()));
            }

            let mut chunk = [0u8; 8192];
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                self.ended = true;
                self.queued.push_back(ClientEvent::End {
                    reason: "socket closed".into(),
                });
                continue;
            }

            let mut data = chunk[..n].to_vec();
            if let Some(cipher) = &mut self.cipher {
                cipher.decrypt(&mut data);
            }
            // A corrupt length prefix is fatal: without it the stream can
            // never realign.
            let frames = self.splitter.feed(&data)?;
            for body in frames {
                self.handle_frame(&body).await?;
            }
        }
    }

    async fn handle_frame(&mut self, body: &[u8]) -> Result<(), ClientError> {
        let packet = {
            let decompressed = match self.compressor.decode(body) {
                Ok(d) => d,
                Err(e) => {
                    warn!(state = %self.state, "dropping undecodable frame: {e}");
                    self.queued.push_back(ClientEvent::PacketDropped {
                        error: e.to_string(),
                    });
                    return Ok(());
                }
            };
            let codec = self
                .protocol
                .codec(self.state, Direction::ToClient)
                .ok_or(ClientError::NoCodec {
                    state: self.state,
                    direction: Direction::ToClient,
                })?;
            match codec.read(&decompressed) {
                Ok(packet) => packet,
                Err(e) => {
                    // The length prefix was already consumed, so the stream
                    // stays aligned; only this packet is lost.
                    warn!(state = %self.state, "dropping packet: {e}");
                    self.queued.push_back(ClientEvent::PacketDropped {
                        error: e.to_string(),
                    });
                    return Ok(());
                }
            }
        };

        self.queued.push_back(ClientEvent::Packet {
            name: packet.name.clone(),
            params: packet.params.clone(),
        });
        self.react(packet).await
    }

    /// Automatic responses of the login/configuration/play sub-protocols.
    async fn react(&mut self, packet: Packet) -> Result<(), ClientError> {
        let name = packet.name.as_str();
        match (self.state, name) {
            (State::Login, "compress") => {
                let threshold = int_field(&packet.params, "threshold")? as i32;
                self.compressor = Compressor::new(threshold);
                self.queued
                    .push_back(ClientEvent::CompressionEnabled { threshold });
            }
            (State::Login, "encryption_begin") => {
                self.begin_encryption(&packet.params).await?;
            }
            (State::Login, "success") => {
                let username = str_field(&packet.params, "username")?.to_string();
                let uuid = uuid_field(&packet.params, "uuid")?;
                info!(%username, %uuid, "login success");
                self.profile = Some(Profile { username, uuid });
                if self.protocol.has_configuration() {
                    self.send("login_acknowledged", &json!({})).await?;
                    self.set_state(State::Configuration);
                } else {
                    self.set_state(State::Play);
                    self.emit_login();
                }
            }
            (State::Configuration, "select_known_packs") => {
                // We bring no packs of our own.
                self.send("select_known_packs", &json!({"packs": []})).await?;
            }
            (State::Configuration, "finish_configuration") => {
                self.send("finish_configuration", &json!({})).await?;
                self.set_state(State::Play);
                self.emit_login();
            }
            (State::Configuration, "ping") => {
                let id = int_field(&packet.params, "id")?;
                self.send("pong", &json!({"id": id})).await?;
            }
            (State::Configuration | State::Play, "keep_alive") => {
                if self.options.auto_keep_alive {
                    let id = int_field(&packet.params, "keepAliveId")?;
                    self.send("keep_alive", &json!({"keepAliveId": id})).await?;
                }
            }
            (State::Play, "start_configuration") => {
                self.send("configuration_acknowledged", &json!({})).await?;
                self.set_state(State::Configuration);
            }
            (_, "disconnect") => {
                let reason = packet.params["reason"].to_string();
                info!(%reason, state = %self.state, "server disconnected us");
                self.ended = true;
                self.queued.push_back(ClientEvent::End { reason });
            }
            _ => {}
        }
        Ok(())
    }

    /// Key exchange. The cipher is installed whenever the server asks —
    /// offline mode only skips the session-server join, since without an
    /// access token there is nothing to prove.
    async fn begin_encryption(&mut self, params: &Value) -> Result<(), ClientError> {
        let server_id = str_field(params, "serverId")?.to_string();
        let public_key = value_to_bytes(&params["publicKey"])?;
        let verify_token = value_to_bytes(&params["verifyToken"])?;

        let secret = generate_shared_secret();
        let key = parse_public_key(&public_key)?;
        let wrapped_secret = encrypt_pkcs1(&key, &secret)?;
        let wrapped_token = encrypt_pkcs1(&key, &verify_token)?;

        if self.options.online_mode {
            let access_token = self
                .options
                .access_token
                .clone()
                .ok_or(ClientError::MissingCredentials)?;
            let selected_profile = self
                .options
                .selected_profile
                .clone()
                .ok_or(ClientError::MissingCredentials)?;
            let hash = server_hash(&server_id, &secret, &public_key);
            session::join(
                &self.options.session_server,
                &access_token,
                &selected_profile,
                &hash,
            )
            .await?;
        }

        self.send(
            "encryption_begin",
            &json!({
                "sharedSecret": bytes_to_value(&wrapped_secret),
                "verifyToken": bytes_to_value(&wrapped_token),
            }),
        )
        .await?;

        // From the first byte after this point both directions are
        // encrypted.
        self.cipher = Some(PacketCipher::new(&secret));
        self.queued.push_back(ClientEvent::EncryptionEnabled);
        Ok(())
    }

    fn emit_login(&mut self) {
        if self.login_emitted {
            return;
        }
        if let Some(profile) = &self.profile {
            self.login_emitted = true;
            self.queued.push_back(ClientEvent::Login {
                username: profile.username.clone(),
                uuid: profile.uuid,
            });
        }
    }

    fn set_state(&mut self, to: State) {
        let from = self.state;
        debug!(%from, %to, "state transition");
        self.state = to;
        // Buffered partial frames belong to the old state's codec.
        self.splitter.reset();
        self.queued
            .push_back(ClientEvent::StateChange { from, to });
    }
}

fn int_field(params: &Value, field: &'static str) -> Result<i64, ClientError> {
    params[field].as_i64().ok_or(ClientError::BadPacket(field))
}

fn str_field<'v>(params: &'v Value, field: &'static str) -> Result<&'v str, ClientError> {
    params[field].as_str().ok_or(ClientError::BadPacket(field))
}

fn uuid_field(params: &Value, field: &'static str) -> Result<Uuid, ClientError> {
    Uuid::parse_str(str_field(params, field)?).map_err(|_| ClientError::BadPacket(field))
}

#[cfg(test)]
mod tests {
    use super::*;

    use rsa::pkcs8::EncodePublicKey;
    use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
    use tokio::io::DuplexStream;

    /// Minimal in-process server speaking the same protocol over a duplex
    /// pipe.
    struct TestServer {
        stream: DuplexStream,
        protocol: Protocol,
        compressor: Compressor,
        cipher: Option<PacketCipher>,
        splitter: Splitter,
        frames: VecDeque<Vec<u8>>,
    }

    impl TestServer {
        fn new(stream: DuplexStream, version: i32) -> Self {
            Self {
                stream,
                protocol: Protocol::builtin(version).unwrap(),
                compressor: Compressor::disabled(),
                cipher: None,
                splitter: Splitter::new(),
                frames: VecDeque::new(),
            }
        }

        async fn send(&mut self, state: State, name: &str, params: &Value) {
            let codec = self.protocol.codec(state, Direction::ToClient).unwrap();
            let body = codec.write(name, params).unwrap();
            let body = self.compressor.encode(&body).unwrap();
            let mut framed = frame(&body).to_vec();
            if let Some(cipher) = &mut self.cipher {
                cipher.encrypt(&mut framed);
            }
            self.stream.write_all(&framed).await.unwrap();
        }

        async fn recv(&mut self, state: State) -> Packet {
            loop {
                if let Some(body) = self.frames.pop_front() {
                    let body = self.compressor.decode(&body).unwrap();
                    let codec = self.protocol.codec(state, Direction::ToServer).unwrap();
                    return codec.read(&body).unwrap();
                }
                let mut chunk = [0u8; 8192];
                let n = self.stream.read(&mut chunk).await.unwrap();
                assert!(n > 0, "client hung up mid-test");
                let mut data = chunk[..n].to_vec();
                if let Some(cipher) = &mut self.cipher {
                    cipher.decrypt(&mut data);
                }
                for body in self.splitter.feed(&data).unwrap() {
                    self.frames.push_back(body.to_vec());
                }
            }
        }
    }

    fn pair(version: i32, options: ClientOptions) -> (Connection<DuplexStream>, TestServer) {
        let (client_side, server_side) = tokio::io::duplex(1 << 16);
        let connection = Connection::new(client_side, Protocol::builtin(version).unwrap(), options);
        (connection, TestServer::new(server_side, version))
    }

    async fn expect_packet(conn: &mut Connection<DuplexStream>, name: &str) -> Value {
        loop {
            match conn.next_event().await.unwrap() {
                ClientEvent::Packet { name: got, params } if got == name => return params,
                ClientEvent::Packet { .. }
                | ClientEvent::StateChange { .. }
                | ClientEvent::CompressionEnabled { .. }
                | ClientEvent::EncryptionEnabled
                | ClientEvent::Login { .. } => continue,
                other => panic!("unexpected event while waiting for {name}: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn handshake_carries_options() {
        let mut options = ClientOptions::new("Steve");
        options.host = "play.example.net".into();
        options.port = 25570;
        let (mut conn, mut server) = pair(765, options);

        conn.start_login().await.unwrap();
        let handshake = server.recv(State::Handshaking).await;
        assert_eq!(handshake.name, "set_protocol");
        assert_eq!(handshake.params["protocolVersion"], 765);
        assert_eq!(handshake.params["serverHost"], "play.example.net");
        assert_eq!(handshake.params["serverPort"], 25570);
        assert_eq!(handshake.params["nextState"], 2);

        let login_start = server.recv(State::Login).await;
        assert_eq!(login_start.name, "login_start");
        assert_eq!(login_start.params["username"], "Steve");
        assert_eq!(
            login_start.params["playerUUID"],
            "5627dd98-e6be-3c21-b8a8-e92344183641"
        );
        assert_eq!(conn.state(), State::Login);
    }

    #[tokio::test]
    async fn full_login_with_configuration() {
        let (mut conn, mut server) = pair(765, ClientOptions::new("Steve"));
        conn.start_login().await.unwrap();
        server.recv(State::Handshaking).await;
        server.recv(State::Login).await;

        // Compression first, like vanilla.
        server
            .send(State::Login, "compress", &json!({"threshold": 64}))
            .await;
        server.compressor = Compressor::new(64);

        server
            .send(
                State::Login,
                "success",
                &json!({
                    "uuid": "5627dd98-e6be-3c21-b8a8-e92344183641",
                    "username": "Steve",
                    "properties": [],
                }),
            )
            .await;

        // compress packet then its effect.
        assert!(matches!(
            conn.next_event().await.unwrap(),
            ClientEvent::Packet { ref name, .. } if name == "compress"
        ));
        assert_eq!(
            conn.next_event().await.unwrap(),
            ClientEvent::CompressionEnabled { threshold: 64 }
        );
        assert_eq!(conn.compression_threshold(), 64);

        // success → acknowledged → configuration.
        assert!(matches!(
            conn.next_event().await.unwrap(),
            ClientEvent::Packet { ref name, .. } if name == "success"
        ));
        assert!(matches!(
            conn.next_event().await.unwrap(),
            ClientEvent::StateChange {
                from: State::Login,
                to: State::Configuration
            }
        ));
        let ack = server.recv(State::Login).await;
        assert_eq!(ack.name, "login_acknowledged");

        // Known packs are answered with an empty set.
        server
            .send(
                State::Configuration,
                "select_known_packs",
                &json!({"packs": [{"namespace": "minecraft", "id": "core", "version": "1.20.4"}]}),
            )
            .await;
        expect_packet(&mut conn, "select_known_packs").await;
        let reply = server.recv(State::Configuration).await;
        assert_eq!(reply.name, "select_known_packs");
        assert_eq!(reply.params["packs"], json!([]));

        // Registry data is surfaced but not answered.
        server
            .send(
                State::Configuration,
                "registry_data",
                &json!({"codec": [0x0a, 0x00]}),
            )
            .await;
        let registry = expect_packet(&mut conn, "registry_data").await;
        assert_eq!(registry["codec"], json!([0x0a, 0x00]));

        // Finish: the client echoes and enters play, and only now is login
        // emitted.
        server
            .send(State::Configuration, "finish_configuration", &json!({}))
            .await;
        expect_packet(&mut conn, "finish_configuration").await;
        assert!(matches!(
            conn.next_event().await.unwrap(),
            ClientEvent::StateChange {
                from: State::Configuration,
                to: State::Play
            }
        ));
        let login = conn.next_event().await.unwrap();
        assert_eq!(
            login,
            ClientEvent::Login {
                username: "Steve".into(),
                uuid: Uuid::parse_str("5627dd98-e6be-3c21-b8a8-e92344183641").unwrap(),
            }
        );
        let finish = server.recv(State::Configuration).await;
        assert_eq!(finish.name, "finish_configuration");
        assert_eq!(conn.state(), State::Play);
        assert_eq!(conn.profile().unwrap().username, "Steve");
    }

    #[tokio::test]
    async fn legacy_login_skips_configuration() {
        let (mut conn, mut server) = pair(763, ClientOptions::new("Alex"));
        conn.start_login().await.unwrap();
        server.recv(State::Handshaking).await;
        server.recv(State::Login).await;

        server
            .send(
                State::Login,
                "success",
                &json!({
                    "uuid": "b50ad385-829d-3141-a216-7e7d7539ba7f",
                    "username": "Alex",
                    "properties": [],
                }),
            )
            .await;

        expect_packet(&mut conn, "success").await;
        assert!(matches!(
            conn.next_event().await.unwrap(),
            ClientEvent::StateChange {
                from: State::Login,
                to: State::Play
            }
        ));
        assert!(matches!(
            conn.next_event().await.unwrap(),
            ClientEvent::Login { .. }
        ));
        assert_eq!(conn.state(), State::Play);
    }

    #[tokio::test]
    async fn keep_alive_is_echoed_verbatim() {
        let (mut conn, mut server) = pair(763, ClientOptions::new("Alex"));
        conn.start_login().await.unwrap();
        server.recv(State::Handshaking).await;
        server.recv(State::Login).await;
        server
            .send(
                State::Login,
                "success",
                &json!({"uuid": "b50ad385-829d-3141-a216-7e7d7539ba7f", "username": "Alex", "properties": []}),
            )
            .await;
        conn.login_drain().await;

        server
            .send(
                State::Play,
                "keep_alive",
                &json!({"keepAliveId": -384927134058i64}),
            )
            .await;
        expect_packet(&mut conn, "keep_alive").await;
        let echo = server.recv(State::Play).await;
        assert_eq!(echo.name, "keep_alive");
        assert_eq!(echo.params["keepAliveId"], -384927134058i64);
    }

    #[tokio::test]
    async fn play_can_reenter_configuration() {
        let (mut conn, mut server) = pair(765, ClientOptions::new("Steve"));
        conn.start_login().await.unwrap();
        server.recv(State::Handshaking).await;
        server.recv(State::Login).await;
        server
            .send(
                State::Login,
                "success",
                &json!({"uuid": "5627dd98-e6be-3c21-b8a8-e92344183641", "username": "Steve", "properties": []}),
            )
            .await;
        // Drive the client through success so the acknowledgement is on
        // the wire before the server waits for it.
        expect_packet(&mut conn, "success").await;
        server.recv(State::Login).await; // login_acknowledged
        server
            .send(State::Configuration, "finish_configuration", &json!({}))
            .await;
        conn.login_drain().await;
        server.recv(State::Configuration).await; // finish_configuration echo
        assert_eq!(conn.state(), State::Play);

        server
            .send(State::Play, "start_configuration", &json!({}))
            .await;
        expect_packet(&mut conn, "start_configuration").await;
        assert!(matches!(
            conn.next_event().await.unwrap(),
            ClientEvent::StateChange {
                from: State::Play,
                to: State::Configuration
            }
        ));
        let ack = server.recv(State::Play).await;
        assert_eq!(ack.name, "configuration_acknowledged");
        assert_eq!(conn.state(), State::Configuration);
    }

    #[tokio::test]
    async fn encryption_installs_cipher_even_offline() {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let public_der = RsaPublicKey::from(&private)
            .to_public_key_der()
            .unwrap()
            .into_vec();

        let (mut conn, mut server) = pair(765, ClientOptions::new("Steve"));
        conn.start_login().await.unwrap();
        server.recv(State::Handshaking).await;
        server.recv(State::Login).await;

        let token = [7u8, 7, 7, 7];
        server
            .send(
                State::Login,
                "encryption_begin",
                &json!({
                    "serverId": "",
                    "publicKey": bytes_to_value(&public_der),
                    "verifyToken": bytes_to_value(&token),
                }),
            )
            .await;

        expect_packet(&mut conn, "encryption_begin").await;
        assert_eq!(conn.next_event().await.unwrap(), ClientEvent::EncryptionEnabled);

        // The reply itself is still plaintext.
        let reply = server.recv(State::Login).await;
        assert_eq!(reply.name, "encryption_begin");
        let secret = private
            .decrypt(
                Pkcs1v15Encrypt,
                &value_to_bytes(&reply.params["sharedSecret"]).unwrap(),
            )
            .unwrap();
        let echoed_token = private
            .decrypt(
                Pkcs1v15Encrypt,
                &value_to_bytes(&reply.params["verifyToken"]).unwrap(),
            )
            .unwrap();
        assert_eq!(echoed_token, token);
        assert_eq!(secret.len(), 16);

        // From here on the server talks through the shared cipher.
        let mut key = [0u8; 16];
        key.copy_from_slice(&secret);
        server.cipher = Some(PacketCipher::new(&key));

        server
            .send(
                State::Login,
                "success",
                &json!({"uuid": "5627dd98-e6be-3c21-b8a8-e92344183641", "username": "Steve", "properties": []}),
            )
            .await;
        expect_packet(&mut conn, "success").await;
        assert_eq!(conn.state(), State::Configuration);

        // And the encrypted login_acknowledged decrypts on the server side.
        let ack = server.recv(State::Login).await;
        assert_eq!(ack.name, "login_acknowledged");
    }

    #[tokio::test]
    async fn unknown_packet_is_dropped_not_fatal() {
        let (mut conn, mut server) = pair(765, ClientOptions::new("Steve"));
        conn.start_login().await.unwrap();
        server.recv(State::Handshaking).await;
        server.recv(State::Login).await;

        // A frame with an id the login codec does not know.
        server.stream.write_all(&frame(&[0x7f, 0x01])).await.unwrap();
        assert!(matches!(
            conn.next_event().await.unwrap(),
            ClientEvent::PacketDropped { .. }
        ));

        // The stream is still aligned: a real packet right after decodes.
        server
            .send(State::Login, "compress", &json!({"threshold": 32}))
            .await;
        expect_packet(&mut conn, "compress").await;
    }

    #[tokio::test]
    async fn disconnect_ends_the_session() {
        let (mut conn, mut server) = pair(765, ClientOptions::new("Steve"));
        conn.start_login().await.unwrap();
        server.recv(State::Handshaking).await;
        server.recv(State::Login).await;

        server
            .send(State::Login, "disconnect", &json!({"reason": "\"bye\""}))
            .await;
        expect_packet(&mut conn, "disconnect").await;
        assert!(matches!(
            conn.next_event().await.unwrap(),
            ClientEvent::End { .. }
        ));
        assert!(conn.next_event().await.is_err());
    }

    #[tokio::test]
    async fn socket_close_drains_buffered_frames_first() {
        let (mut conn, mut server) = pair(765, ClientOptions::new("Steve"));
        conn.start_login().await.unwrap();
        server.recv(State::Handshaking).await;
        server.recv(State::Login).await;

        server
            .send(State::Login, "compress", &json!({"threshold": 9}))
            .await;
        drop(server);

        // The already-written packet arrives before the end notification.
        expect_packet(&mut conn, "compress").await;
        loop {
            match conn.next_event().await.unwrap() {
                ClientEvent::End { .. } => break,
                _ => continue,
            }
        }
    }

    impl Connection<DuplexStream> {
        /// Test helper: consume events until login has been emitted.
        async fn login_drain(&mut self) {
            loop {
                if let ClientEvent::Login { .. } = self.next_event().await.unwrap() {
                    return;
                }
            }
        }
    }
}
