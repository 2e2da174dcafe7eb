/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use std::{convert::TryFrom, io, sync::Arc};

use rustls::{
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    ClientConfig, ClientConnection, RootCertStore, SignatureScheme,
};
use rustls_pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::{client::TlsStream, TlsConnector};

use crate::{transport::Transport, Error, SmtpClient, State};

impl<T: Transport> SmtpClient<T> {
    /// Sends STARTTLS. Fails without writing anything when the server did
    /// not advertise the extension.
    pub async fn request_tls(&mut self) -> crate::Result<()> {
        if !self.capabilities.starttls {
            log::debug!("STARTTLS requested but not advertised");
            return Err(Error::MissingStartTls);
        }

        let reply = self.cmd(b"STARTTLS\r\n").await?;
        if reply.is_negative() {
            return Err(Error::UnexpectedReply {
                command: "STARTTLS",
                reply,
            });
        }
        self.set_state(State::TlsUpgrading);
        Ok(())
    }
}

impl SmtpClient<TcpStream> {
    /// Upgrades the connection with STARTTLS and queries the capabilities
    /// again over the secured channel.
    pub async fn start_tls(
        mut self,
        tls_connector: &TlsConnector,
        hostname: &str,
    ) -> crate::Result<SmtpClient<TlsStream<TcpStream>>> {
        self.request_tls().await?;

        let mut client = self.into_tls(tls_connector, hostname).await?;
        client.ehlo().await?;
        Ok(client)
    }

    /// Runs the TLS handshake over the socket. The plaintext session is
    /// consumed and its capabilities discarded.
    pub async fn into_tls(
        self,
        tls_connector: &TlsConnector,
        hostname: &str,
    ) -> crate::Result<SmtpClient<TlsStream<TcpStream>>> {
        let server_name = ServerName::try_from(hostname)
            .map_err(|_| Error::InvalidTLSName)?
            .to_owned();

        let SmtpClient {
            stream,
            timeout,
            local_host,
            sender,
            state,
            ..
        } = self;

        let stream = tokio::time::timeout(timeout, tls_connector.connect(server_name, stream))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(|err| {
                let kind = err.kind();
                if let Some(inner) = err.into_inner() {
                    match inner.downcast::<rustls::Error>() {
                        Ok(error) => Error::Tls(*error),
                        Err(error) => Error::Io(io::Error::new(kind, error)),
                    }
                } else {
                    Error::Io(io::Error::new(kind, "TLS handshake failed"))
                }
            })?;

        log::debug!("TLS established with {}", hostname);

        Ok(SmtpClient {
            stream,
            timeout,
            capabilities: Default::default(),
            local_host,
            sender,
            state,
            authenticated: false,
        })
    }
}

impl SmtpClient<TlsStream<TcpStream>> {
    pub fn tls_connection(&self) -> &ClientConnection {
        self.stream.get_ref().1
    }
}

/// Builds a connector trusting the webpki roots, or any certificate at all
/// when `allow_invalid_certs` is set.
pub fn build_tls_connector(allow_invalid_certs: bool) -> TlsConnector {
    let config = if !allow_invalid_certs {
        let mut root_cert_store = RootCertStore::empty();
        root_cert_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        ClientConfig::builder()
            .with_root_certificates(root_cert_store)
            .with_no_client_auth()
    } else {
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(DummyVerifier {}))
            .with_no_client_auth()
    };

    TlsConnector::from(Arc::new(config))
}

#[doc(hidden)]
#[derive(Debug)]
struct DummyVerifier;

impl ServerCertVerifier for DummyVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls_pki_types::CertificateDer<'_>,
        _intermediates: &[rustls_pki_types::CertificateDer<'_>],
        _server_name: &rustls_pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls_pki_types::UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls_pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls_pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use tokio::net::{TcpListener, TcpStream};

    use crate::{
        smtp::tls::build_tls_connector,
        transport::{self, mock::MockTransport},
        Error, SmtpClient, State,
    };

    #[tokio::test]
    async fn starttls_requires_capability() {
        let mut client = SmtpClient::new(
            MockTransport::new(["220 never read\r\n"]),
            Duration::from_secs(5),
            "client.test",
        );
        assert!(matches!(
            client.request_tls().await,
            Err(Error::MissingStartTls)
        ));
        assert!(client.stream.written.is_empty());
    }

    #[tokio::test]
    async fn starttls_refused() {
        let mut client = SmtpClient::new(
            MockTransport::new(["454 TLS not available\r\n"]),
            Duration::from_secs(5),
            "client.test",
        );
        client.capabilities.starttls = true;
        match client.request_tls().await {
            Err(Error::UnexpectedReply { command, reply }) => {
                assert_eq!(command, "STARTTLS");
                assert_eq!(reply.code(), 454);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_ne!(client.state(), State::TlsUpgrading);

        let mut client = SmtpClient::new(
            MockTransport::new(["220 Ready to start TLS\r\n"]),
            Duration::from_secs(5),
            "client.test",
        );
        client.capabilities.starttls = true;
        client.request_tls().await.unwrap();
        assert_eq!(client.state(), State::TlsUpgrading);
        assert_eq!(client.stream.lines(), ["STARTTLS"]);
    }

    #[tokio::test]
    async fn invalid_tls_name() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stream: TcpStream = transport::connect(addr, Duration::from_secs(5))
            .await
            .unwrap();

        let client = SmtpClient::new(stream, Duration::from_secs(5), "client.test");
        assert!(matches!(
            client
                .into_tls(&build_tls_connector(true), "not a valid name")
                .await,
            Err(Error::InvalidTLSName)
        ));
    }
}
