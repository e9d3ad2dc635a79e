//! Handshake drivers.
//!
//! Runs the six-operation handshake over a raw byte stream, one driver
//! per role. State progression:
//!
//! ```text
//! Init → ClientHelloSent → ServerHelloVerified → KeyEstablished
//!      → ChallengeIssued → Authenticated
//! ```
//!
//! Any out-of-state message, signature failure, or decrypt failure is an
//! error; the caller drops the stream without telling the peer why. No
//! handshake state survives a failure.

use peerwire_protocol::{
    random_challenge, Frame, FrameCodec, FrameKind, HandshakeMessage, IdentityKeyPair,
    KemKeyPair, KemPublicKey, ProtocolError, SessionKey, Signature, VerifyingKey,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

use crate::error::{NodeError, Result};
use crate::framed;

/// Runs the server side of the handshake.
///
/// `root` is the application's long-lived signing identity. On success
/// the client is authenticated and the returned codec carries the
/// session's symmetric key.
pub async fn serve<S>(stream: &mut S, root: &IdentityKeyPair) -> Result<(SessionKey, FrameCodec)>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut codec = FrameCodec::new();

    let message = recv(stream, &codec, "Init").await?;
    let HandshakeMessage::ClientHello = message else {
        return Err(unexpected(&message, "Init"));
    };
    trace!("client hello received");

    // Fresh KEM keypair per handshake, signed by the root identity so the
    // client can tell it apart from an active interceptor's.
    let kem = KemKeyPair::generate();
    let signature = root.sign(kem.public_key().as_bytes());
    send(
        stream,
        &codec,
        &HandshakeMessage::ServerHello {
            public_key: kem.public_key().to_hex(),
            signature: signature.to_hex(),
        },
    )
    .await?;

    let message = recv(stream, &codec, "HelloPresented").await?;
    let HandshakeMessage::ClientKey { encapsulated } = message else {
        return Err(unexpected(&message, "HelloPresented"));
    };
    let ciphertext = hex::decode(&encapsulated).map_err(ProtocolError::from)?;
    codec.install_key(kem.decapsulate(&ciphertext)?);
    trace!("symmetric key established");

    // From here on every frame is encrypted. The challenge doubles as a
    // key confirmation: a client without the key cannot read it.
    let challenge = random_challenge();
    send(
        stream,
        &codec,
        &HandshakeMessage::Challenge {
            challenge: challenge.clone(),
        },
    )
    .await?;

    let message = recv(stream, &codec, "ChallengeIssued").await?;
    let HandshakeMessage::ClientAuth {
        public_key,
        signature,
    } = message
    else {
        return Err(unexpected(&message, "ChallengeIssued"));
    };

    // The presented public key *is* the session identity; the signature
    // over our challenge proves possession of its secret half.
    let client_key = VerifyingKey::from_hex(&public_key)?;
    let signature = Signature::from_hex(&signature)?;
    client_key.verify(challenge.as_bytes(), &signature)?;
    let session_key = client_key.session_key();

    send(
        stream,
        &codec,
        &HandshakeMessage::Accept {
            session_key: session_key.as_str().to_string(),
        },
    )
    .await?;

    debug!(session = %session_key, "handshake accepted");
    Ok((session_key, codec))
}

/// Runs the client side of the handshake.
///
/// `identity` is the client's session keypair; reusing it across
/// connections is what makes resumption possible. `trusted` is the set
/// of root keys the client accepts for this application.
pub async fn connect<S>(
    stream: &mut S,
    identity: &IdentityKeyPair,
    trusted: &[VerifyingKey],
) -> Result<FrameCodec>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut codec = FrameCodec::new();

    send(stream, &codec, &HandshakeMessage::ClientHello).await?;

    let message = recv(stream, &codec, "ClientHelloSent").await?;
    let HandshakeMessage::ServerHello {
        public_key,
        signature,
    } = message
    else {
        return Err(unexpected(&message, "ClientHelloSent"));
    };

    let kem_key = KemPublicKey::from_hex(&public_key)?;
    let signature = Signature::from_hex(&signature)?;
    let verified = trusted
        .iter()
        .any(|root| root.verify(kem_key.as_bytes(), &signature).is_ok());
    if !verified {
        return Err(ProtocolError::InvalidSignature(
            "server key is not signed by a trusted root".to_string(),
        )
        .into());
    }
    trace!("server hello verified");

    let (ciphertext, symmetric) = kem_key.encapsulate();
    send(
        stream,
        &codec,
        &HandshakeMessage::ClientKey {
            encapsulated: hex::encode(ciphertext),
        },
    )
    .await?;
    codec.install_key(symmetric);

    let message = recv(stream, &codec, "KeyEstablished").await?;
    let HandshakeMessage::Challenge { challenge } = message else {
        return Err(unexpected(&message, "KeyEstablished"));
    };

    let signature = identity.sign(challenge.as_bytes());
    send(
        stream,
        &codec,
        &HandshakeMessage::ClientAuth {
            public_key: identity.verifying_key().to_hex(),
            signature: signature.to_hex(),
        },
    )
    .await?;

    let message = recv(stream, &codec, "Authenticating").await?;
    let HandshakeMessage::Accept { session_key } = message else {
        return Err(unexpected(&message, "Authenticating"));
    };
    if session_key != identity.session_key().as_str() {
        return Err(ProtocolError::SessionKeyMismatch.into());
    }

    debug!(session = %identity.session_key(), "handshake complete");
    Ok(codec)
}

async fn send<S>(stream: &mut S, codec: &FrameCodec, message: &HandshakeMessage) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let frame = Frame::handshake(message.to_bytes()?);
    framed::write_frame(stream, &codec.encode(&frame)?).await
}

async fn recv<S>(stream: &mut S, codec: &FrameCodec, state: &'static str) -> Result<HandshakeMessage>
where
    S: AsyncRead + Unpin,
{
    let bytes = framed::read_frame(stream)
        .await?
        .ok_or(NodeError::StreamClosed)?;
    let frame = codec.decode(&bytes)?;
    if frame.kind != FrameKind::Handshake {
        return Err(ProtocolError::MalformedFrame(format!(
            "expected a handshake frame in state {}, got {:?}",
            state, frame.kind
        ))
        .into());
    }
    Ok(HandshakeMessage::from_bytes(&frame.payload)?)
}

fn unexpected(message: &HandshakeMessage, state: &'static str) -> NodeError {
    ProtocolError::UnexpectedMessage {
        op: message.op(),
        state,
    }
    .into()
}
